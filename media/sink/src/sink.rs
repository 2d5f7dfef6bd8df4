/*!
    Encoder and muxer for one output file.
*/

use std::path::Path;

use ffmpeg_next::{
    ChannelLayout, Dictionary, Packet, codec, encoder,
    format::{self, Pixel, Sample, context::Output, sample::Type as SampleType},
    util::error::EAGAIN,
    util::frame::audio::Audio as FfmpegAudio,
};

use revid_transform::{AudioTransform, AudioTransformConfig, ScalingAlgorithm, VideoTransform};
use revid_types::{
    AudioFrame, AudioOutput, EncoderSettings, Error, MediaWriter, Rational, Result, VideoFrame,
    VideoOutput, WriterConfig,
};

use crate::config::SinkConfig;

/// Frame size used when an encoder accepts any number of samples.
const FALLBACK_FRAME_SIZE: usize = 1024;

/// Settings keys interpreted by the sink rather than forwarded to the encoder.
const RESERVED_KEYS: &[&str] = &["codec", "bitrate", "width", "height", "sample_rate", "channels"];

fn to_ffmpeg(r: Rational) -> ffmpeg_next::Rational {
    ffmpeg_next::Rational::new(r.num, r.den)
}

/**
    Writes reversed video (and optionally audio) into a container.

    Video frames are converted to the encoder's pixel format and size,
    audio frames are resampled and re-chunked to the encoder's frame size.
    Timestamps on incoming frames are taken as output timestamps.

    Call [`MediaWriter::finish`] to flush encoders and write the trailer;
    without it the container is left incomplete.
*/
pub struct Sink {
    output: Output,
    video: VideoStream,
    audio: Option<AudioStream>,
}

// SAFETY: the muxer, encoders and conversion contexts are owned exclusively
// by this sink and only touched through `&mut self`.
unsafe impl Send for Sink {}

struct VideoStream {
    encoder: encoder::video::Encoder,
    index: usize,
    output_time_base: Rational,
    time_base: ffmpeg_next::Rational,
    stream_time_base: ffmpeg_next::Rational,
    transform: VideoTransform,
    format: Pixel,
    width: u32,
    height: u32,
}

struct AudioStream {
    encoder: encoder::audio::Encoder,
    index: usize,
    time_base: ffmpeg_next::Rational,
    stream_time_base: ffmpeg_next::Rational,
    transform: AudioTransform,
    fifo: SampleFifo,
    frame_size: usize,
    next_pts: i64,
}

impl Sink {
    /**
        Create the output file at `path` and open encoders for every
        configured stream, then write the container header.
    */
    pub fn create(path: &Path, writer: &WriterConfig, config: SinkConfig) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        let mut output = format::output_as(path, config.format.ffmpeg_format_name())
            .map_err(|e| Error::codec(format!("cannot create {}: {e}", path.display())))?;
        let global_header = output
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);

        let mut video = open_video(&mut output, &writer.video, global_header)?;
        let mut audio = match &writer.audio {
            Some(audio) => Some(open_audio(&mut output, audio, global_header)?),
            None => None,
        };

        let mut options = Dictionary::new();
        if config.fast_start && config.format.supports_fast_start() {
            options.set("movflags", "+faststart");
        }
        output
            .write_header_with(options)
            .map_err(|e| Error::codec(format!("cannot write header: {e}")))?;

        // the muxer may pick its own stream time bases while writing the header
        video.stream_time_base = stream_time_base(&output, video.index)?;
        if let Some(audio) = audio.as_mut() {
            audio.stream_time_base = stream_time_base(&output, audio.index)?;
        }

        tracing::debug!(
            target: "revid::sink",
            path = %path.display(),
            width = video.width,
            height = video.height,
            audio = audio.is_some(),
            "opened sink"
        );

        Ok(Self {
            output,
            video,
            audio,
        })
    }

    fn drain_video(&mut self) -> Result<()> {
        drain_packets(
            &mut self.video.encoder,
            &mut self.output,
            self.video.index,
            self.video.time_base,
            self.video.stream_time_base,
        )
    }

    fn drain_audio_fifo(&mut self, flush: bool) -> Result<()> {
        let Some(audio) = self.audio.as_mut() else {
            return Ok(());
        };

        while audio.fifo.len() >= audio.frame_size || (flush && audio.fifo.len() > 0) {
            let frame = audio.fifo.pop_frame(audio.frame_size, audio.next_pts);
            audio.next_pts += audio.frame_size as i64;

            audio
                .encoder
                .send_frame(&frame)
                .map_err(|e| Error::codec(format!("audio encode failed: {e}")))?;

            drain_packets(
                &mut audio.encoder,
                &mut self.output,
                audio.index,
                audio.time_base,
                audio.stream_time_base,
            )?;
        }

        Ok(())
    }
}

impl MediaWriter for Sink {
    fn write_video(&mut self, frame: &VideoFrame) -> Result<()> {
        let video = &mut self.video;
        let mut converted = video
            .transform
            .unpack(frame, video.format, video.width, video.height)?;

        let pts = frame.pts.rescale(frame.time_base, video.output_time_base);
        converted.set_pts(Some(pts.0));

        video
            .encoder
            .send_frame(&converted)
            .map_err(|e| Error::codec(format!("video encode failed: {e}")))?;

        self.drain_video()
    }

    fn write_audio(&mut self, frame: &AudioFrame) -> Result<()> {
        let Some(audio) = self.audio.as_mut() else {
            return Err(Error::invalid_data("sink was created without an audio stream"));
        };

        let converted = audio.transform.transform(frame)?;
        audio.fifo.push(&converted);

        self.drain_audio_fifo(false)
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        if let Some(audio) = self.audio.as_mut() {
            if let Some(tail) = audio.transform.flush()? {
                audio.fifo.push(&tail);
            }
        }
        self.drain_audio_fifo(true)?;

        if let Some(audio) = self.audio.as_mut() {
            audio
                .encoder
                .send_eof()
                .map_err(|e| Error::codec(format!("audio flush failed: {e}")))?;
            drain_packets(
                &mut audio.encoder,
                &mut self.output,
                audio.index,
                audio.time_base,
                audio.stream_time_base,
            )?;
        }

        self.video
            .encoder
            .send_eof()
            .map_err(|e| Error::codec(format!("video flush failed: {e}")))?;
        self.drain_video()?;

        self.output
            .write_trailer()
            .map_err(|e| Error::codec(format!("cannot write trailer: {e}")))?;

        tracing::debug!(target: "revid::sink", "sink finished");
        Ok(())
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("width", &self.video.width)
            .field("height", &self.video.height)
            .field("audio", &self.audio.is_some())
            .finish_non_exhaustive()
    }
}

fn open_video(output: &mut Output, config: &VideoOutput, global_header: bool) -> Result<VideoStream> {
    let codec = find_encoder(&config.settings, &[codec::Id::H264, codec::Id::MPEG4])?;

    // 4:2:0 encoders reject odd dimensions
    let width = config.settings.get_parsed("width").unwrap_or(config.width).max(2) & !1;
    let height = config.settings.get_parsed("height").unwrap_or(config.height).max(2) & !1;
    let time_base = to_ffmpeg(config.time_base);

    let mut stream = output
        .add_stream(codec)
        .map_err(|e| Error::codec(format!("cannot add video stream: {e}")))?;
    stream.set_time_base(time_base);
    let index = stream.index();

    let mut encoder = codec::context::Context::new_with_codec(codec)
        .encoder()
        .video()
        .map_err(|e| Error::codec(format!("cannot create video encoder: {e}")))?;

    encoder.set_width(width);
    encoder.set_height(height);
    encoder.set_format(Pixel::YUV420P);
    encoder.set_time_base(time_base);
    if !config.frame_rate.is_unset() {
        encoder.set_frame_rate(Some(to_ffmpeg(config.frame_rate)));
    }
    if let Some(bitrate) = config.settings.get_parsed::<usize>("bitrate") {
        encoder.set_bit_rate(bitrate);
    }
    if global_header {
        encoder.set_flags(codec::Flags::GLOBAL_HEADER);
    }

    let encoder = encoder
        .open_as_with(codec, encoder_options(&config.settings))
        .map_err(|e| Error::codec(format!("cannot open video encoder: {e}")))?;
    stream.set_parameters(&encoder);

    Ok(VideoStream {
        encoder,
        index,
        output_time_base: config.time_base,
        time_base,
        stream_time_base: time_base,
        transform: VideoTransform::new(ScalingAlgorithm::Bicubic),
        format: Pixel::YUV420P,
        width,
        height,
    })
}

fn open_audio(output: &mut Output, config: &AudioOutput, global_header: bool) -> Result<AudioStream> {
    let codec = find_encoder(&config.settings, &[codec::Id::AAC])?;

    let sample_rate = config.settings.get_parsed("sample_rate").unwrap_or(config.sample_rate);
    let channels = config.settings.get_parsed("channels").unwrap_or(config.channels).max(1);
    let format = encoder_sample_format(codec.id());
    let time_base = ffmpeg_next::Rational::new(1, sample_rate as i32);

    let mut stream = output
        .add_stream(codec)
        .map_err(|e| Error::codec(format!("cannot add audio stream: {e}")))?;
    stream.set_time_base(time_base);
    let index = stream.index();

    let mut encoder = codec::context::Context::new_with_codec(codec)
        .encoder()
        .audio()
        .map_err(|e| Error::codec(format!("cannot create audio encoder: {e}")))?;

    encoder.set_rate(sample_rate as i32);
    encoder.set_channel_layout(ChannelLayout::default(channels as i32));
    encoder.set_format(format);
    encoder.set_time_base(time_base);
    if let Some(bitrate) = config.settings.get_parsed::<usize>("bitrate") {
        encoder.set_bit_rate(bitrate);
    }
    if global_header {
        encoder.set_flags(codec::Flags::GLOBAL_HEADER);
    }

    let encoder = encoder
        .open_as_with(codec, encoder_options(&config.settings))
        .map_err(|e| Error::codec(format!("cannot open audio encoder: {e}")))?;
    stream.set_parameters(&encoder);

    let frame_size = match encoder.frame_size() as usize {
        0 => FALLBACK_FRAME_SIZE,
        n => n,
    };

    Ok(AudioStream {
        encoder,
        index,
        time_base,
        stream_time_base: time_base,
        transform: AudioTransform::new(AudioTransformConfig {
            format,
            channels,
            sample_rate,
        }),
        fifo: SampleFifo::new(format, channels),
        frame_size,
        next_pts: 0,
    })
}

/**
    Resolve the encoder named by the `codec` setting, or the first available
    of `defaults`.
*/
fn find_encoder(settings: &EncoderSettings, defaults: &[codec::Id]) -> Result<ffmpeg_next::Codec> {
    if let Some(name) = settings.get("codec") {
        return encoder::find_by_name(name)
            .ok_or_else(|| Error::unsupported_format(format!("no encoder named {name}")));
    }

    defaults
        .iter()
        .find_map(|id| encoder::find(*id))
        .ok_or_else(|| Error::unsupported_format(format!("no encoder for {defaults:?}")))
}

/**
    Sample layout each audio encoder accepts natively.
*/
fn encoder_sample_format(id: codec::Id) -> Sample {
    match id {
        codec::Id::OPUS => Sample::F32(SampleType::Packed),
        codec::Id::FLAC | codec::Id::PCM_S16LE | codec::Id::MP2 => Sample::I16(SampleType::Packed),
        codec::Id::PCM_F32LE => Sample::F32(SampleType::Packed),
        _ => Sample::F32(SampleType::Planar),
    }
}

fn encoder_options(settings: &EncoderSettings) -> Dictionary<'static> {
    let mut options = Dictionary::new();
    for (key, value) in settings.iter() {
        if !RESERVED_KEYS.contains(&key) {
            options.set(key, value);
        }
    }
    options
}

fn stream_time_base(output: &Output, index: usize) -> Result<ffmpeg_next::Rational> {
    output
        .stream(index)
        .map(|stream| stream.time_base())
        .ok_or(Error::NoSuchStream { index })
}

/**
    Receive every pending packet from `encoder` and hand it to the muxer.
*/
fn drain_packets(
    encoder: &mut encoder::Encoder,
    output: &mut Output,
    index: usize,
    from: ffmpeg_next::Rational,
    to: ffmpeg_next::Rational,
) -> Result<()> {
    let mut packet = Packet::empty();
    loop {
        match encoder.receive_packet(&mut packet) {
            Ok(()) => {
                packet.set_stream(index);
                packet.rescale_ts(from, to);
                packet
                    .write_interleaved(output)
                    .map_err(|e| Error::codec(format!("cannot write packet: {e}")))?;
            }
            Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => return Ok(()),
            Err(ffmpeg_next::Error::Eof) => return Ok(()),
            Err(e) => return Err(Error::codec(format!("encode failed: {e}"))),
        }
    }
}

/**
    Byte FIFO per plane, used to feed encoders that need a fixed number of
    samples per frame.
*/
struct SampleFifo {
    format: Sample,
    channels: u16,
    planes: Vec<Vec<u8>>,
    unit: usize,
}

impl SampleFifo {
    fn new(format: Sample, channels: u16) -> Self {
        let (plane_count, unit) = if format.is_planar() {
            (channels as usize, format.bytes())
        } else {
            (1, format.bytes() * channels as usize)
        };

        Self {
            format,
            channels,
            planes: vec![Vec::new(); plane_count],
            unit,
        }
    }

    /// Samples per channel currently buffered.
    fn len(&self) -> usize {
        self.planes.first().map_or(0, |p| p.len() / self.unit)
    }

    fn push(&mut self, frame: &FfmpegAudio) {
        let bytes = frame.samples() * self.unit;
        for (index, plane) in self.planes.iter_mut().enumerate() {
            plane.extend_from_slice(&frame.data(index)[..bytes]);
        }
    }

    /**
        Pop `samples` samples into a new frame, zero-padding a short tail.
    */
    fn pop_frame(&mut self, samples: usize, pts: i64) -> FfmpegAudio {
        let available = self.len().min(samples);
        let mut frame = FfmpegAudio::new(
            self.format,
            samples,
            ChannelLayout::default(self.channels as i32),
        );
        frame.set_pts(Some(pts));

        let take = available * self.unit;
        let total = samples * self.unit;
        for (index, plane) in self.planes.iter_mut().enumerate() {
            let dst = &mut frame.data_mut(index)[..total];
            dst[..take].copy_from_slice(&plane[..take]);
            dst[take..].fill(0);
            plane.drain(..take);
        }

        frame
    }
}
