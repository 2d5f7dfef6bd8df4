/*!
    Frame conversion between revid frames and FFmpeg frames.

    This crate is the adapter layer on both ends of the reversal pipeline:
    - **Video**: decoded FFmpeg frames in whatever pixel format the codec
      produced are converted and packed into fixed-size revid frames; on the
      way out, packed frames are spread back into FFmpeg frames in the pixel
      format the encoder wants.
    - **Audio**: interleaved revid audio is converted to the encoder's sample
      format, channel count and rate.

    # Video Transformation

    ```ignore
    use revid_transform::{VideoTransform, ScalingAlgorithm};
    use revid_types::PixelFormat;

    let mut transform = VideoTransform::new(ScalingAlgorithm::Bilinear);

    // Decoder output -> packed YUV 4:2:0
    let packed = transform.pack(&decoded, PixelFormat::Yuv420p)?;

    // Packed frame -> encoder input
    let encoder_frame = transform.unpack(&frame, Pixel::YUV420P, 1920, 1080)?;
    ```

    # Audio Transformation

    ```ignore
    use revid_transform::{AudioTransform, AudioTransformConfig};

    let mut transform = AudioTransform::new(AudioTransformConfig {
        format: Sample::F32(SampleType::Planar),
        channels: 2,
        sample_rate: 48000,
    });

    for frame in reversed_units {
        let encoder_frame = transform.transform(&frame)?;
        // Send to encoder
    }

    if let Some(tail) = transform.flush()? {
        // Send final samples
    }
    ```

    # Lazy Initialization

    Both transformers lazily initialize their FFmpeg contexts on first use
    and rebuild them if the input geometry or format changes mid-stream.
    Conversions that change nothing skip the context entirely.
*/

pub use revid_types::{AudioFrame, Error, PixelFormat, Result, SampleFormat, VideoFrame};

mod audio;
mod video;

pub use audio::{AudioTransform, AudioTransformConfig, sample_format_to_ffmpeg};
pub use video::{ScalingAlgorithm, VideoTransform, pixel_format_to_ffmpeg, plane_layout};
