/*!
    The FFmpeg-backed [`MediaBackend`].
*/

use std::path::Path;

use revid_decode::{AudioDecoder, VideoDecoder, VideoDecoderConfig};
use revid_sink::{Sink, SinkConfig};
use revid_types::{
    AudioReader, MediaBackend, MediaWriter, Result, SourceMedia, Track, VideoReader, WriterConfig,
};

/**
    Decodes with `revid-decode` and writes with `revid-sink`.

    The output container follows the output file's extension, MP4 when
    it has none that is recognized.
*/
#[derive(Clone, Debug)]
pub struct FfmpegBackend {
    decoder: VideoDecoderConfig,
    fast_start: bool,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self {
            decoder: VideoDecoderConfig::new(),
            fast_start: true,
        }
    }
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decoder_config(mut self, config: VideoDecoderConfig) -> Self {
        self.decoder = config;
        self
    }

    /**
        Move the MP4/MOV index to the front of the file (on by default).
    */
    pub fn with_fast_start(mut self, enabled: bool) -> Self {
        self.fast_start = enabled;
        self
    }
}

impl MediaBackend for FfmpegBackend {
    fn probe(&self, locator: &Path) -> Result<SourceMedia> {
        revid_decode::probe(locator)
    }

    fn open_video(&self, source: &SourceMedia, track: &Track) -> Result<Box<dyn VideoReader>> {
        let decoder = VideoDecoder::open(source.locator(), track, self.decoder.clone())?;
        Ok(Box::new(decoder))
    }

    fn open_audio(&self, source: &SourceMedia, track: &Track) -> Result<Box<dyn AudioReader>> {
        let decoder = AudioDecoder::open(source.locator(), track)?;
        Ok(Box::new(decoder))
    }

    fn create_writer(&self, locator: &Path, config: &WriterConfig) -> Result<Box<dyn MediaWriter>> {
        let sink_config = SinkConfig::for_path(locator).with_fast_start(self.fast_start);
        let sink = Sink::create(locator, config, sink_config)?;
        Ok(Box::new(sink))
    }
}
