/*!
    Forward audio decoding.
*/

use std::collections::VecDeque;
use std::path::Path;

use ffmpeg_next::{
    codec::{self, decoder::Audio as FfmpegAudioDecoder},
    format::{self, context::Input},
    util::error::EAGAIN,
    util::frame::audio::Audio as FfmpegAudio,
};

use revid_types::{
    AudioFrame, AudioReader, Error, Pts, Rational, Result, SampleFormat, Track, TrackKind,
};

use crate::demux::{DecodeState, next_packet};
use crate::probe::{open_error, rational_from_ffmpeg};

/**
    Decodes one audio track front to back into interleaved frames.

    Frames keep the decoder's native sample format, rate and channel count;
    planar output is interleaved on the way out.
*/
pub struct AudioDecoder {
    input: Input,
    stream_index: usize,
    decoder: FfmpegAudioDecoder,
    time_base: Rational,
    next_pts: Pts,
    pending: VecDeque<AudioFrame>,
    state: DecodeState,
}

// SAFETY: the demuxer and codec contexts are owned exclusively by this
// decoder and only touched through `&mut self`.
unsafe impl Send for AudioDecoder {}

impl AudioDecoder {
    /**
        Open `path` and prepare a decoder for `track`.
    */
    pub fn open(path: &Path, track: &Track) -> Result<Self> {
        if track.kind != TrackKind::Audio {
            return Err(Error::NoSuchStream { index: track.index });
        }

        crate::init()?;

        let input = format::input(path).map_err(|e| open_error(path, e))?;
        let stream = input
            .stream(track.index)
            .ok_or(Error::NoSuchStream { index: track.index })?;
        let time_base = rational_from_ffmpeg(stream.time_base());

        let decoder_ctx = codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| Error::codec(e.to_string()))?;

        let decoder = decoder_ctx
            .decoder()
            .audio()
            .map_err(|e| Error::codec(e.to_string()))?;

        tracing::debug!(
            target: "revid::decode",
            stream = track.index,
            sample_rate = decoder.rate(),
            channels = decoder.channels(),
            "opened audio decoder"
        );

        Ok(Self {
            input,
            stream_index: track.index,
            decoder,
            time_base,
            next_pts: Pts::ZERO,
            pending: VecDeque::new(),
            state: DecodeState::Reading,
        })
    }

    /**
        Get the sample rate of the decoded audio.
    */
    pub fn sample_rate(&self) -> u32 {
        self.decoder.rate()
    }

    /**
        Get the number of channels.
    */
    pub fn channels(&self) -> u16 {
        self.decoder.channels() as u16
    }

    fn receive_frames(&mut self) -> Result<()> {
        let mut decoded = FfmpegAudio::empty();

        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    if decoded.samples() == 0 {
                        continue;
                    }
                    let frame = self.convert_frame(&decoded)?;
                    self.pending.push_back(frame);
                }
                Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => break,
                Err(ffmpeg_next::Error::Eof) => break,
                Err(e) => return Err(Error::codec(e.to_string())),
            }
        }

        Ok(())
    }

    fn convert_frame(&mut self, frame: &FfmpegAudio) -> Result<AudioFrame> {
        let samples = frame.samples();
        let sample_rate = frame.rate();
        let channels = frame.channels() as u16;

        let ffmpeg_format = frame.format();
        let format = sample_format_from_ffmpeg(ffmpeg_format).ok_or_else(|| {
            Error::unsupported_format(format!("unsupported sample format: {ffmpeg_format:?}"))
        })?;

        let pts = frame.timestamp().or_else(|| frame.pts()).map(Pts).unwrap_or(self.next_pts);
        let advance = Rational::rescale(
            samples as i64,
            Rational::new(1, sample_rate.max(1) as i32),
            self.time_base,
        );
        self.next_pts = Pts(pts.0 + advance);

        let data = copy_audio_data(frame, format, samples, channels);

        Ok(AudioFrame::new(
            data,
            samples,
            sample_rate,
            channels,
            format,
            pts,
            self.time_base,
        ))
    }
}

impl AudioReader for AudioDecoder {
    fn next_frame(&mut self) -> Result<Option<AudioFrame>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }

            match self.state {
                DecodeState::Done => return Ok(None),
                DecodeState::Draining => {
                    self.receive_frames()?;
                    self.state = DecodeState::Done;
                }
                DecodeState::Reading => match next_packet(&mut self.input, self.stream_index)? {
                    Some(packet) => {
                        self.decoder
                            .send_packet(&packet)
                            .map_err(|e| Error::codec(e.to_string()))?;
                        self.receive_frames()?;
                    }
                    None => {
                        self.decoder
                            .send_eof()
                            .map_err(|e| Error::codec(e.to_string()))?;
                        self.state = DecodeState::Draining;
                    }
                },
            }
        }
    }
}

/**
    Copy audio data from an FFmpeg frame, interleaving planar layouts.
*/
fn copy_audio_data(
    frame: &FfmpegAudio,
    format: SampleFormat,
    samples: usize,
    channels: u16,
) -> Vec<u8> {
    let bytes_per_sample = format.bytes_per_sample();
    let total_bytes = samples * channels as usize * bytes_per_sample;

    if frame.is_planar() {
        let mut output = vec![0u8; total_bytes];

        for ch in 0..channels as usize {
            let plane_data = frame.data(ch);
            for s in 0..samples {
                let src_offset = s * bytes_per_sample;
                let dst_offset = (s * channels as usize + ch) * bytes_per_sample;
                output[dst_offset..dst_offset + bytes_per_sample]
                    .copy_from_slice(&plane_data[src_offset..src_offset + bytes_per_sample]);
            }
        }

        output
    } else {
        frame.data(0)[..total_bytes].to_vec()
    }
}

/**
    Convert FFmpeg sample format to our SampleFormat.
*/
pub(crate) fn sample_format_from_ffmpeg(format: ffmpeg_next::format::Sample) -> Option<SampleFormat> {
    use ffmpeg_next::format::Sample;

    match format {
        Sample::F32(_) => Some(SampleFormat::F32),
        Sample::F64(_) => Some(SampleFormat::F64),
        Sample::I16(_) => Some(SampleFormat::S16),
        Sample::I32(_) => Some(SampleFormat::S32),
        Sample::U8(_) => Some(SampleFormat::U8),
        _ => None,
    }
}

impl std::fmt::Debug for AudioDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDecoder")
            .field("stream_index", &self.stream_index)
            .field("time_base", &self.time_base)
            .field("sample_rate", &self.decoder.rate())
            .field("channels", &self.decoder.channels())
            .finish_non_exhaustive()
    }
}
