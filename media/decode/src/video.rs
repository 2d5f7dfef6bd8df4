/*!
    Forward video decoding.
*/

use std::collections::VecDeque;
use std::path::Path;

use ffmpeg_next::{
    codec::{self, decoder::Video as FfmpegVideoDecoder, threading},
    format::{self, context::Input},
    util::error::EAGAIN,
    util::frame::video::Video as FfmpegVideo,
};

use revid_transform::{ScalingAlgorithm, VideoTransform};
use revid_types::{
    Error, MediaDuration, Pts, Rational, Result, Track, TrackKind, VideoFrame, VideoReader,
};

use crate::config::VideoDecoderConfig;
use crate::demux::{DecodeState, next_packet};
use crate::probe::{open_error, rational_from_ffmpeg};

/**
    Decodes one video track front to back.

    Every frame comes out packed in the configured pixel format at the
    track's native dimensions, in presentation order, carrying its source
    timestamp, nominal duration and keyframe flag.
*/
pub struct VideoDecoder {
    input: Input,
    stream_index: usize,
    decoder: FfmpegVideoDecoder,
    transform: VideoTransform,
    config: VideoDecoderConfig,
    time_base: Rational,
    frame_duration: MediaDuration,
    last_pts: Option<Pts>,
    pending: VecDeque<VideoFrame>,
    state: DecodeState,
}

// SAFETY: the demuxer and codec contexts are owned exclusively by this
// decoder and only touched through `&mut self`.
unsafe impl Send for VideoDecoder {}

impl VideoDecoder {
    /**
        Open `path` and prepare a decoder for `track`.
    */
    pub fn open(path: &Path, track: &Track, config: VideoDecoderConfig) -> Result<Self> {
        if track.kind != TrackKind::Video {
            return Err(Error::NoSuchStream { index: track.index });
        }

        crate::init()?;

        let input = format::input(path).map_err(|e| open_error(path, e))?;
        let stream = input
            .stream(track.index)
            .ok_or(Error::NoSuchStream { index: track.index })?;
        let time_base = rational_from_ffmpeg(stream.time_base());

        let mut ctx = codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| Error::codec(e.to_string()))?;
        if config.threads > 0 {
            ctx.set_threading(threading::Config {
                kind: threading::Type::Frame,
                count: config.threads,
                ..Default::default()
            });
        }

        let decoder = ctx
            .decoder()
            .video()
            .map_err(|e| Error::codec(e.to_string()))?;

        let frame_duration = match track.frame_rate() {
            Some(rate) if !rate.is_unset() && !time_base.is_unset() => {
                MediaDuration(Rational::rescale(1, rate.invert(), time_base))
            }
            _ => MediaDuration::ZERO,
        };

        tracing::debug!(
            target: "revid::decode",
            stream = track.index,
            width = decoder.width(),
            height = decoder.height(),
            %time_base,
            "opened video decoder"
        );

        Ok(Self {
            input,
            stream_index: track.index,
            decoder,
            transform: VideoTransform::new(ScalingAlgorithm::Bilinear),
            config,
            time_base,
            frame_duration,
            last_pts: None,
            pending: VecDeque::new(),
            state: DecodeState::Reading,
        })
    }

    /**
        Time base of the timestamps on emitted frames.
    */
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    fn receive_frames(&mut self) -> Result<()> {
        let mut decoded = FfmpegVideo::empty();

        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
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

    fn convert_frame(&mut self, decoded: &FfmpegVideo) -> Result<VideoFrame> {
        let pts = decoded
            .timestamp()
            .or_else(|| decoded.pts())
            .map(Pts)
            .unwrap_or_else(|| match self.last_pts {
                Some(last) => last + self.frame_duration,
                None => Pts::ZERO,
            });
        self.last_pts = Some(pts);

        let data = self.transform.pack(decoded, self.config.output_format)?;

        Ok(VideoFrame::new(
            data,
            decoded.width(),
            decoded.height(),
            self.config.output_format,
            pts,
            self.frame_duration,
            decoded.is_key(),
            self.time_base,
        ))
    }
}

impl VideoReader for VideoDecoder {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
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

impl std::fmt::Debug for VideoDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoDecoder")
            .field("stream_index", &self.stream_index)
            .field("time_base", &self.time_base)
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
