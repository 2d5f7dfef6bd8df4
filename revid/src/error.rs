/*!
    Structured failures of a reversal export.

    Every failure carries a domain, a stable numeric code and a readable
    description, so hosts can route errors without matching on variants.
*/

use revid_types::TrackKind;

use crate::store::StoreError;

/// Domain shared by every [`ReverseError`].
pub const ERROR_DOMAIN: &str = "revid.export";

/**
    Result of a finished export.
*/
pub type ExportResult = Result<crate::engine::ExportSummary, ReverseError>;

/**
    Failure of an export or of one of its stages.

    Codes in the -100 range are session level, -200 belong to the audio
    exporter and -300 to the intermediate audio store.
*/
#[derive(Debug, thiserror::Error)]
pub enum ReverseError {
    /// No output location was configured.
    #[error("no output location was set")]
    MissingOutput,

    /// The source could not be probed or its video could not be opened.
    #[error("unable to start reading the source: {0}")]
    UnableToStartReader(#[source] revid_types::Error),

    /// The source has no decodable video frames.
    #[error("the source has no decodable video samples")]
    NoSamples,

    /// The output file or its encoders could not be created.
    #[error("unable to start writing the output: {0}")]
    UnableToStartWriter(#[source] revid_types::Error),

    /// A single frame or sample group failed to decode, buffer or write.
    #[error("unable to write {stream:?} frame {position}: {source}")]
    UnableToWriteFrame {
        stream: TrackKind,
        position: u64,
        #[source]
        source: revid_types::Error,
    },

    /// The audio track ordinal does not name an audio track of the source.
    #[error("audio track {index} does not exist (source has {available})")]
    InvalidTrackIndex { index: usize, available: usize },

    /// No decoder could be attached to the audio track.
    #[error("cannot read audio track {index}: {source}")]
    CannotAddInput {
        index: usize,
        #[source]
        source: revid_types::Error,
    },

    /// The intermediate audio store could not be created.
    #[error("cannot create the intermediate audio store: {0}")]
    CannotAddOutput(#[source] StoreError),

    /// Another export is still running on the same instance.
    #[error("an export is already in progress")]
    ExportInProgress,

    /// Reading or writing the intermediate audio store failed.
    #[error("intermediate audio store failed: {0}")]
    AudioStore(#[from] StoreError),
}

impl ReverseError {
    /**
        Error domain, always [`ERROR_DOMAIN`].
    */
    pub fn domain(&self) -> &'static str {
        ERROR_DOMAIN
    }

    /**
        Stable numeric code of this failure.
    */
    pub fn code(&self) -> i32 {
        match self {
            Self::MissingOutput => -100,
            Self::UnableToStartReader(_) => -101,
            Self::NoSamples => -102,
            Self::UnableToStartWriter(_) => -103,
            Self::UnableToWriteFrame { .. } => -104,
            Self::InvalidTrackIndex { .. } => -200,
            Self::CannotAddInput { .. } => -201,
            Self::CannotAddOutput(_) => -202,
            Self::ExportInProgress => -203,
            Self::AudioStore(_) => -300,
        }
    }

    /**
        Human-readable description, including the underlying cause.
    */
    pub fn description(&self) -> String {
        self.to_string()
    }

    pub(crate) fn video_frame(position: u64, source: impl Into<revid_types::Error>) -> Self {
        Self::UnableToWriteFrame {
            stream: TrackKind::Video,
            position,
            source: source.into(),
        }
    }

    pub(crate) fn audio_frame(position: u64, source: impl Into<revid_types::Error>) -> Self {
        Self::UnableToWriteFrame {
            stream: TrackKind::Audio,
            position,
            source: source.into(),
        }
    }
}
