/*!
    Decoded frame types.

    These are the sample units that cross the backend seam: decoders
    produce them in forward order, the reversal pipeline buffers and
    reorders them, and writers consume them. Nothing mutates a frame after
    it is created; reordering only ever moves whole frames.
*/

use std::time::Duration;

use crate::{MediaDuration, PixelFormat, Pts, Rational, SampleFormat};

/**
    A decoded video frame.

    `data` holds exactly `format.frame_len(width, height)` bytes with no row
    padding.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoFrame {
    /// Tightly packed pixel data.
    pub data: Vec<u8>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format of the data.
    pub format: PixelFormat,
    /// Presentation timestamp in `time_base` units.
    pub pts: Pts,
    /// How long this frame is displayed, in `time_base` units.
    pub duration: MediaDuration,
    /// Whether the compressed source frame was a keyframe.
    pub keyframe: bool,
    /// Time base for interpreting `pts` and `duration`.
    pub time_base: Rational,
}

impl VideoFrame {
    /**
        Create a new video frame.
    */
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        pts: Pts,
        duration: MediaDuration,
        keyframe: bool,
        time_base: Rational,
    ) -> Self {
        Self {
            data,
            width,
            height,
            format,
            pts,
            duration,
            keyframe,
            time_base,
        }
    }

    /**
        Returns the presentation time as a Duration.
    */
    pub fn presentation_time(&self) -> Duration {
        self.pts.to_duration(self.time_base)
    }

    /**
        Returns the number of bytes a frame of this geometry must hold.
    */
    pub fn expected_data_len(&self) -> usize {
        self.format.frame_len(self.width, self.height)
    }
}

/**
    A decoded audio frame.

    Samples are interleaved for multi-channel audio:
    for stereo F32 the layout is `[L0, R0, L1, R1, ...]`.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFrame {
    /**
        Raw sample data as bytes.
    */
    pub data: Vec<u8>,
    /**
        Number of samples per channel.
    */
    pub samples: usize,
    /**
        Sample rate in Hz.
    */
    pub sample_rate: u32,
    /**
        Number of interleaved channels.
    */
    pub channels: u16,
    /**
        Sample format.
    */
    pub format: SampleFormat,
    /**
        Presentation timestamp in `time_base` units.
    */
    pub pts: Pts,
    /**
        Time base for interpreting the PTS.
    */
    pub time_base: Rational,
}

impl AudioFrame {
    /**
        Create a new audio frame.
    */
    pub fn new(
        data: Vec<u8>,
        samples: usize,
        sample_rate: u32,
        channels: u16,
        format: SampleFormat,
        pts: Pts,
        time_base: Rational,
    ) -> Self {
        Self {
            data,
            samples,
            sample_rate,
            channels,
            format,
            pts,
            time_base,
        }
    }

    /**
        Returns the duration of this frame based on sample count and rate.
    */
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples as f64 / self.sample_rate as f64)
    }

    /**
        Returns the size in bytes of one interleaved sample frame
        (one sample for every channel).
    */
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }

    /**
        Returns the expected data length in bytes.
    */
    pub fn expected_data_len(&self) -> usize {
        self.samples * self.bytes_per_frame()
    }
}

// Frames move between the blocking pool and async tasks
static_assertions::assert_impl_all!(VideoFrame: Send, Sync);
static_assertions::assert_impl_all!(AudioFrame: Send, Sync);
