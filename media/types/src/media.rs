/*!
    Source media description.
*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CodecId, Rational, SampleFormat};

/**
    Type of media track.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    /// Video track
    Video,
    /// Audio track
    Audio,
}

/**
    Format descriptor of a track, by kind.
*/
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TrackFormat {
    Video {
        /// Natural width in pixels.
        width: u32,
        /// Natural height in pixels.
        height: u32,
        /// Nominal frame rate (0/1 when the container does not say).
        frame_rate: Rational,
    },
    Audio {
        /// Sample rate in Hz.
        sample_rate: u32,
        /// Number of channels.
        channels: u16,
        /// Decoded sample format, if the probe could determine it.
        sample_format: Option<SampleFormat>,
    },
}

/**
    One decodable track of a source file. Read-only, derived from the probe.
*/
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Stream index inside the container.
    pub index: usize,
    /// Video or audio.
    pub kind: TrackKind,
    /// Codec identifier.
    pub codec: CodecId,
    /// Time base of the track's timestamps.
    pub time_base: Rational,
    /// Kind-specific format descriptor.
    pub format: TrackFormat,
    /// Track duration, when the container reports one.
    pub duration: Option<Duration>,
    /// Number of frames, when the container reports one.
    pub frame_count: Option<u64>,
}

impl Track {
    /**
        Returns `(width, height)` for video tracks.
    */
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self.format {
            TrackFormat::Video { width, height, .. } => Some((width, height)),
            TrackFormat::Audio { .. } => None,
        }
    }

    /**
        Returns the nominal frame rate for video tracks, if known.
    */
    pub fn frame_rate(&self) -> Option<Rational> {
        match self.format {
            TrackFormat::Video { frame_rate, .. } if !frame_rate.is_unset() => Some(frame_rate),
            _ => None,
        }
    }

    /**
        Returns the sample rate for audio tracks.
    */
    pub fn sample_rate(&self) -> Option<u32> {
        match self.format {
            TrackFormat::Audio { sample_rate, .. } => Some(sample_rate),
            TrackFormat::Video { .. } => None,
        }
    }

    /**
        Returns the channel count for audio tracks.
    */
    pub fn channels(&self) -> Option<u16> {
        match self.format {
            TrackFormat::Audio { channels, .. } => Some(channels),
            TrackFormat::Video { .. } => None,
        }
    }
}

/**
    A probed source file: locator, duration and ordered tracks.

    Loaded once; immutable after probing succeeds.
*/
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceMedia {
    /// Where the source lives.
    pub locator: PathBuf,
    /// Overall container duration.
    pub duration: Duration,
    /// Tracks in container order.
    pub tracks: Vec<Track>,
}

impl SourceMedia {
    pub fn new(locator: impl Into<PathBuf>, duration: Duration, tracks: Vec<Track>) -> Self {
        Self {
            locator: locator.into(),
            duration,
            tracks,
        }
    }

    pub fn locator(&self) -> &Path {
        &self.locator
    }

    /**
        Iterate the video tracks in container order.
    */
    pub fn video_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Video)
    }

    /**
        Iterate the audio tracks in container order.
    */
    pub fn audio_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Audio)
    }

    /**
        The video track used for reversal. Any further video tracks are ignored.
    */
    pub fn primary_video(&self) -> Option<&Track> {
        self.video_tracks().next()
    }

    /**
        The `ordinal`-th audio track (0-based, counting audio tracks only).
    */
    pub fn audio_track(&self, ordinal: usize) -> Option<&Track> {
        self.audio_tracks().nth(ordinal)
    }

    /**
        Highest nominal frame rate across all video tracks, in frames per second.
    */
    pub fn max_frame_rate(&self) -> f64 {
        self.video_tracks()
            .filter_map(Track::frame_rate)
            .map(Rational::to_f64)
            .fold(0.0, f64::max)
    }

    /**
        Natural `(width, height)` of the primary video track.
    */
    pub fn natural_size(&self) -> Option<(u32, u32)> {
        self.primary_video().and_then(Track::dimensions)
    }
}
