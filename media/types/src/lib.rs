/*!
    Shared types for the revid reversal pipeline.

    This crate defines the vocabulary of the workspace: the types that cross
    crate boundaries and the backend traits that separate the reversal
    pipeline from any particular codec stack. It has no dependency on FFmpeg,
    so the pipeline can be driven and tested without native libraries.

    # Core Types

    - [`Rational`] - Rational numbers for time bases and frame rates
    - [`Pts`] and [`MediaDuration`] - Timestamps in time_base units
    - [`VideoFrame`] and [`AudioFrame`] - Decoded sample units

    # Format Types

    - [`PixelFormat`] - Video pixel formats
    - [`SampleFormat`] - Audio sample formats
    - [`CodecId`] - Codec identifiers

    # Source Description

    - [`SourceMedia`] - A probed file with its ordered [`Track`]s
    - [`TrackKind`] and [`TrackFormat`] - Per-track descriptors

    # Backend Seam

    - [`MediaBackend`] - Probe, open readers, open writers
    - [`VideoReader`], [`AudioReader`] - Forward decoders
    - [`MediaWriter`] - Encoder + muxer
    - [`EncoderSettings`] - Opaque per-stream encoder settings

    # Error Handling

    - [`Error`] and [`Result`] - Common error types
*/

mod backend;
mod codec;
mod error;
mod format;
mod frame;
mod media;
mod rational;
mod settings;
mod timestamp;

pub use backend::{
    AudioOutput, AudioReader, MediaBackend, MediaWriter, VideoOutput, VideoReader, WriterConfig,
};
pub use codec::CodecId;
pub use error::{Error, Result};
pub use format::{PixelFormat, SampleFormat};
pub use frame::{AudioFrame, VideoFrame};
pub use media::{SourceMedia, Track, TrackFormat, TrackKind};
pub use rational::Rational;
pub use settings::EncoderSettings;
pub use timestamp::{MediaDuration, Pts};
