/*!
    Audio sample format conversion and resampling.
*/

use ffmpeg_next::{
    ChannelLayout,
    format::{Sample, sample::Type as SampleType},
    software::resampling::Context as ResamplingContext,
    util::frame::audio::Audio as FfmpegAudio,
};

use revid_types::{AudioFrame, Error, Result, SampleFormat};

/**
    Map a revid sample format to FFmpeg's packed (interleaved) variant.
*/
pub fn sample_format_to_ffmpeg(format: SampleFormat) -> Sample {
    match format {
        SampleFormat::U8 => Sample::U8(SampleType::Packed),
        SampleFormat::S16 => Sample::I16(SampleType::Packed),
        SampleFormat::S32 => Sample::I32(SampleType::Packed),
        SampleFormat::F32 => Sample::F32(SampleType::Packed),
        SampleFormat::F64 => Sample::F64(SampleType::Packed),
        _ => Sample::None,
    }
}

/**
    Target of an [`AudioTransform`]: what the encoder expects.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioTransformConfig {
    pub format: Sample,
    pub channels: u16,
    pub sample_rate: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ResamplerKey {
    format: SampleFormat,
    channels: u16,
    sample_rate: u32,
}

struct Resampler {
    key: ResamplerKey,
    context: ResamplingContext,
}

// SAFETY: the SwrContext is owned exclusively by this wrapper and is only
// ever used through `&mut self`.
unsafe impl Send for Resampler {}

/**
    Converts interleaved revid audio into FFmpeg frames in the encoder's
    sample format, channel count and rate.

    The resampler keeps filter history when the rate changes, so frames
    must be fed in order and [`AudioTransform::flush`] called at the end.
*/
pub struct AudioTransform {
    config: AudioTransformConfig,
    resampler: Option<Resampler>,
}

impl AudioTransform {
    pub fn new(config: AudioTransformConfig) -> Self {
        Self {
            config,
            resampler: None,
        }
    }

    pub fn config(&self) -> AudioTransformConfig {
        self.config
    }

    /**
        Convert one interleaved frame. The returned frame's PTS is unset.
    */
    pub fn transform(&mut self, frame: &AudioFrame) -> Result<FfmpegAudio> {
        if frame.data.len() < frame.expected_data_len() {
            return Err(Error::invalid_data(format!(
                "audio frame holds {} bytes, expected {}",
                frame.data.len(),
                frame.expected_data_len()
            )));
        }

        let staged = interleaved_to_ffmpeg(frame)?;
        let key = ResamplerKey {
            format: frame.format,
            channels: frame.channels,
            sample_rate: frame.sample_rate,
        };

        if staged.format() == self.config.format
            && frame.channels == self.config.channels
            && frame.sample_rate == self.config.sample_rate
        {
            return Ok(staged);
        }

        let mut converted = FfmpegAudio::empty();
        self.resampler(key)?
            .run(&staged, &mut converted)
            .map_err(|e| Error::codec(format!("resampling failed: {e}")))?;

        Ok(converted)
    }

    /**
        Drain samples still held by the resampler, if any.
    */
    pub fn flush(&mut self) -> Result<Option<FfmpegAudio>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(None);
        };

        let mut tail = FfmpegAudio::empty();
        resampler
            .context
            .flush(&mut tail)
            .map_err(|e| Error::codec(format!("resampler flush failed: {e}")))?;

        if tail.samples() == 0 {
            Ok(None)
        } else {
            Ok(Some(tail))
        }
    }

    fn resampler(&mut self, key: ResamplerKey) -> Result<&mut ResamplingContext> {
        let stale = self.resampler.as_ref().is_none_or(|r| r.key != key);
        if stale {
            let context = ResamplingContext::get(
                sample_format_to_ffmpeg(key.format),
                ChannelLayout::default(key.channels as i32),
                key.sample_rate,
                self.config.format,
                ChannelLayout::default(self.config.channels as i32),
                self.config.sample_rate,
            )
            .map_err(|e| Error::codec(format!("cannot create resampler: {e}")))?;
            self.resampler = Some(Resampler { key, context });
        }

        match self.resampler.as_mut() {
            Some(resampler) => Ok(&mut resampler.context),
            None => Err(Error::codec("resampler unavailable")),
        }
    }
}

impl std::fmt::Debug for AudioTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioTransform")
            .field("config", &self.config)
            .field("resampler", &self.resampler.as_ref().map(|r| r.key))
            .finish()
    }
}

/**
    Copy an interleaved revid frame into a packed FFmpeg frame.
*/
fn interleaved_to_ffmpeg(frame: &AudioFrame) -> Result<FfmpegAudio> {
    let format = sample_format_to_ffmpeg(frame.format);
    if format == Sample::None {
        return Err(Error::unsupported_format(format!("{:?}", frame.format)));
    }

    let mut out = FfmpegAudio::new(
        format,
        frame.samples,
        ChannelLayout::default(frame.channels as i32),
    );
    out.set_rate(frame.sample_rate);

    let len = frame.expected_data_len();
    out.data_mut(0)[..len].copy_from_slice(&frame.data[..len]);

    Ok(out)
}
