/*!
    The seam between the reversal pipeline and concrete codec stacks.

    A backend knows how to probe a file, decode one track forward, and
    encode + mux a new file. Everything is synchronous: callers run backend
    work on a blocking thread.
*/

use std::path::Path;

use crate::{
    AudioFrame, EncoderSettings, PixelFormat, Rational, Result, SampleFormat, SourceMedia, Track,
    VideoFrame,
};

/**
    Forward decoder for one video track.

    Frames come out in presentation order with exact source timestamps.
*/
pub trait VideoReader: Send {
    /**
        Decode the next frame, or `None` at end of stream.
    */
    fn next_frame(&mut self) -> Result<Option<VideoFrame>>;
}

/**
    Forward decoder for one audio track.

    Frames come out interleaved, in the track's native sample format.
*/
pub trait AudioReader: Send {
    /**
        Decode the next group of samples, or `None` at end of stream.
    */
    fn next_frame(&mut self) -> Result<Option<AudioFrame>>;
}

/**
    Encoder + muxer for the reversed output.
*/
pub trait MediaWriter: Send {
    /**
        Encode one video frame. Timestamps must strictly increase.
    */
    fn write_video(&mut self, frame: &VideoFrame) -> Result<()>;

    /**
        Encode one block of interleaved audio. Timestamps must strictly increase.
    */
    fn write_audio(&mut self, frame: &AudioFrame) -> Result<()>;

    /**
        Flush encoders and finalize the container.
    */
    fn finish(self: Box<Self>) -> Result<()>;
}

/**
    Output description for the video stream.
*/
#[derive(Clone, Debug)]
pub struct VideoOutput {
    pub width: u32,
    pub height: u32,
    /// Layout of the frames that will be written.
    pub format: PixelFormat,
    /// Nominal frame rate, used by encoders that need one.
    pub frame_rate: Rational,
    /// Time base of the timestamps passed to `write_video`.
    pub time_base: Rational,
    /// Passed through to the encoder.
    pub settings: EncoderSettings,
}

/**
    Output description for the audio stream.
*/
#[derive(Clone, Debug)]
pub struct AudioOutput {
    pub sample_rate: u32,
    pub channels: u16,
    /// Sample format of the frames that will be written.
    pub format: SampleFormat,
    /// Time base of the timestamps passed to `write_audio`.
    pub time_base: Rational,
    /// Passed through to the encoder.
    pub settings: EncoderSettings,
}

/**
    Everything a backend needs to open a writer.
*/
#[derive(Clone, Debug)]
pub struct WriterConfig {
    pub video: VideoOutput,
    /// `None` produces an audio-free output.
    pub audio: Option<AudioOutput>,
}

/**
    A concrete decode/encode stack.
*/
pub trait MediaBackend: Send + Sync {
    /**
        Read container metadata without decoding.
    */
    fn probe(&self, locator: &Path) -> Result<SourceMedia>;

    /**
        Open a forward decoder on a video track of a probed source.
    */
    fn open_video(&self, source: &SourceMedia, track: &Track) -> Result<Box<dyn VideoReader>>;

    /**
        Open a forward decoder on an audio track of a probed source.
    */
    fn open_audio(&self, source: &SourceMedia, track: &Track) -> Result<Box<dyn AudioReader>>;

    /**
        Create the output file and its encoders.
    */
    fn create_writer(&self, locator: &Path, config: &WriterConfig) -> Result<Box<dyn MediaWriter>>;
}
