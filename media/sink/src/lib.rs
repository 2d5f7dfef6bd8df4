/*!
    Encoding and muxing for the revid pipeline.

    This crate handles the output side of reversal. It takes decoded frames
    in output order, encodes them and writes them into a container file.

    # Basic Usage

    ```ignore
    use revid_sink::{Sink, SinkConfig};
    use revid_types::{MediaWriter, WriterConfig};

    let mut sink = Sink::create(path, &writer_config, SinkConfig::for_path(path))?;

    for frame in reversed_frames {
        sink.write_video(&frame)?;
    }

    // Flush encoders and finalize the file (critical!)
    Box::new(sink).finish()?;
    ```

    # Container Formats

    - **MP4**: Most compatible, written with fast start by default
    - **MOV**: QuickTime, same muxer family as MP4
    - **MKV**: Most flexible, supports virtually any codec

    # Encoder Settings

    Each stream carries an [`EncoderSettings`] map. A few keys are read by
    the sink itself (`codec`, `bitrate`, `width`, `height`, `sample_rate`,
    `channels`); every other key is passed to the encoder as a private
    option, so `preset`, `crf` and friends work as they do on the FFmpeg
    command line.

    # Finalization

    Without `finish()`:
    - Duration may be unknown to players
    - Seeking may not work
    - Some players won't open the file
*/

pub use revid_types::{EncoderSettings, Error, MediaWriter, Result, WriterConfig};

mod config;
mod sink;

pub use config::{ContainerFormat, SinkConfig};
pub use sink::Sink;
