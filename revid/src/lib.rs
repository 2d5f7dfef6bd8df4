/*!
    Whole-file video reversal.

    Given a source file, [`FrameReversalEngine`] writes a new file whose
    frames play in reverse order at the source's timing, with the first
    audio track reversed alongside it.

    # Components

    - [`SourceAnalyzer`] - Probes a source and answers metadata queries
    - [`AudioTrackExporter`] - Decodes one audio track into an intermediate store
    - [`FrameReversalEngine`] - Runs the whole export
    - [`ReverseError`] - Stable domain and codes for every failure

    # Backends

    Decoding and encoding go through [`MediaBackend`]. The `ffmpeg` feature
    adds [`FfmpegBackend`], built on the `revid-decode` and `revid-sink`
    crates.

    # Logging

    Everything is logged through `tracing` under `revid::*` targets. With
    [`ExportConfig::show_debug`] set, per-phase diagnostics are emitted at
    debug level instead of trace.
*/

/**
    Log at debug level when the first argument is true, at trace otherwise.
*/
macro_rules! diag {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            ::tracing::debug!($($arg)+)
        } else {
            ::tracing::trace!($($arg)+)
        }
    };
}

pub(crate) use diag;

mod analyzer;
mod audio_export;
#[cfg(feature = "ffmpeg")]
mod backend;
mod config;
mod engine;
mod error;
mod plan;
mod progress;
mod store;

pub use analyzer::SourceAnalyzer;
pub use audio_export::{AudioExportSummary, AudioTrackExporter};
#[cfg(feature = "ffmpeg")]
pub use backend::FfmpegBackend;
pub use config::{
    ArenaKind, BufferPolicy, DEFAULT_MAX_RUN_FRAMES, DEFAULT_MEMORY_LIMIT, ExportConfig,
};
pub use engine::{EngineState, ExportHandle, ExportSummary, FrameReversalEngine};
pub use error::{ERROR_DOMAIN, ExportResult, ReverseError};
pub use plan::{
    FrameArena, PlanBuilder, PlannedFrame, ReversalPlan, ReverseFrames, estimate_decoded_bytes,
};
pub use progress::{Operation, Progress, ProgressValue};
pub use store::{
    AudioStoreReader, AudioStoreWriter, DEFAULT_FRAMES_PER_UNIT, ReverseAudioUnits, StoreError,
    StoreLayout, reverse_frames,
};

pub use revid_types::{
    AudioFrame, AudioOutput, AudioReader, CodecId, EncoderSettings, MediaBackend, MediaDuration,
    MediaWriter, PixelFormat, Pts, Rational, SampleFormat, SourceMedia, Track, TrackFormat,
    TrackKind, VideoFrame, VideoOutput, VideoReader, WriterConfig,
};
