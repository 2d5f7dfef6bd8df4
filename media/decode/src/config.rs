/*!
    Decoder configuration types.
*/

use revid_types::PixelFormat;

/**
    Configuration for the video decoder.
*/
#[derive(Clone, Debug)]
pub struct VideoDecoderConfig {
    /// Layout decoded frames are packed into.
    pub output_format: PixelFormat,
    /// Decoder threads (0 lets FFmpeg decide).
    pub threads: usize,
}

impl Default for VideoDecoderConfig {
    fn default() -> Self {
        Self {
            output_format: PixelFormat::Yuv420p,
            threads: 0,
        }
    }
}

impl VideoDecoderConfig {
    /**
        Create a new config with default settings (packed YUV 4:2:0, auto threads).
    */
    pub fn new() -> Self {
        Self::default()
    }

    /**
        Pack decoded frames into a different layout.
    */
    pub fn with_output_format(mut self, format: PixelFormat) -> Self {
        self.output_format = format;
        self
    }

    /**
        Use a fixed number of decoder threads.
    */
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }
}
