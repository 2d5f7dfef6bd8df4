/*!
    Probing and forward decoding for the revid pipeline.

    This crate turns a source file into a description of its tracks and
    into ordered streams of decoded frames. Decoding is strictly forward:
    reversal happens downstream, on the buffered output of these readers.

    # Example

    ```ignore
    use revid_decode::{probe, VideoDecoder, VideoDecoderConfig};
    use revid_types::VideoReader;

    let source = probe(path)?;
    let track = source.primary_video().unwrap();
    let mut decoder = VideoDecoder::open(path, track, VideoDecoderConfig::new())?;

    while let Some(frame) = decoder.next_frame()? {
        // frame.data is packed YUV 4:2:0, frame.pts in the track time base
    }
    ```

    Both decoders implement the backend reader traits from `revid-types`, so
    they can be boxed and handed to the reversal engine directly.
*/

pub use revid_types::{AudioFrame, Error, Result, SourceMedia, VideoFrame};

mod audio;
mod config;
mod demux;
mod probe;
mod video;

pub use audio::AudioDecoder;
pub use config::VideoDecoderConfig;
pub use probe::probe;
pub use video::VideoDecoder;

/**
    Initialize FFmpeg. Safe to call repeatedly.
*/
pub(crate) fn init() -> Result<()> {
    ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))
}
