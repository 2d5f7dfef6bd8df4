/*!
    In-memory media backend for driving the engine without native codecs.

    Sources are registered by path. Writers record what they receive and,
    once finished, register their output as a new source so it can be
    reversed again.
*/

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use revid::{
    AudioFrame, AudioReader, CodecId, MediaBackend, MediaDuration, MediaWriter, PixelFormat, Pts,
    Rational, SampleFormat, SourceMedia, Track, TrackFormat, TrackKind, VideoFrame, VideoReader,
    WriterConfig,
};
use revid_types::{Error, Result};

pub const VIDEO_TB: Rational = Rational::new(1, 1000);
pub const FRAME_MS: i64 = 40;
pub const SAMPLE_RATE: u32 = 8000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/**
    `count` 2x2 gray frames 40ms apart; frame `i` is filled with byte `i`.
    Every `gop`-th frame is a keyframe.
*/
pub fn gray_video(count: usize, gop: usize) -> Vec<VideoFrame> {
    (0..count)
        .map(|i| {
            VideoFrame::new(
                vec![i as u8; 4],
                2,
                2,
                PixelFormat::Gray8,
                Pts(i as i64 * FRAME_MS),
                MediaDuration(FRAME_MS),
                i % gop.max(1) == 0,
                VIDEO_TB,
            )
        })
        .collect()
}

/**
    Mono S16 audio where sample `j` has value `j`, split into blocks of `block`.
*/
pub fn ramp_audio(total: usize, block: usize) -> Vec<AudioFrame> {
    let time_base = Rational::new(1, SAMPLE_RATE as i32);
    (0..total)
        .step_by(block)
        .map(|start| {
            let end = (start + block).min(total);
            let data = (start..end)
                .flat_map(|j| (j as i16).to_le_bytes())
                .collect::<Vec<_>>();
            AudioFrame::new(
                data,
                end - start,
                SAMPLE_RATE,
                1,
                SampleFormat::S16,
                Pts(start as i64),
                time_base,
            )
        })
        .collect()
}

/**
    Decode the sample values of S16 mono frames.
*/
pub fn samples(frames: &[AudioFrame]) -> Vec<i16> {
    frames
        .iter()
        .flat_map(|f| f.data.chunks_exact(2))
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/**
    Playback span of a frame sequence: first start to last end.
*/
pub fn span(frames: &[VideoFrame]) -> Duration {
    match (frames.first(), frames.last()) {
        (Some(first), Some(last)) => {
            let end = last.pts.0 + last.duration.0;
            Pts(end - first.pts.0).to_duration(first.time_base)
        }
        _ => Duration::ZERO,
    }
}

#[derive(Clone, Debug, Default)]
pub struct Synthetic {
    pub video: Vec<Vec<VideoFrame>>,
    pub audio: Vec<Vec<AudioFrame>>,
    pub video_codec: Option<CodecId>,
    /// Report no duration and no frame count for any track.
    pub unknown_length: bool,
}

impl Synthetic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video(mut self, frames: Vec<VideoFrame>) -> Self {
        self.video.push(frames);
        self
    }

    pub fn with_audio(mut self, frames: Vec<AudioFrame>) -> Self {
        self.audio.push(frames);
        self
    }

    pub fn with_video_codec(mut self, codec: CodecId) -> Self {
        self.video_codec = Some(codec);
        self
    }

    pub fn with_unknown_length(mut self) -> Self {
        self.unknown_length = true;
        self
    }

    fn describe(&self, locator: &Path) -> SourceMedia {
        let mut tracks = Vec::new();

        for frames in &self.video {
            let (width, height) = frames.first().map_or((0, 0), |f| (f.width, f.height));
            tracks.push(Track {
                index: tracks.len(),
                kind: TrackKind::Video,
                codec: self.video_codec.unwrap_or(CodecId::H264),
                time_base: VIDEO_TB,
                format: TrackFormat::Video {
                    width,
                    height,
                    frame_rate: Rational::new(25, 1),
                },
                duration: (!self.unknown_length).then(|| span(frames)),
                frame_count: (!self.unknown_length).then_some(frames.len() as u64),
            });
        }

        for frames in &self.audio {
            let samples = frames.iter().map(|f| f.samples as u64).sum::<u64>();
            tracks.push(Track {
                index: tracks.len(),
                kind: TrackKind::Audio,
                codec: CodecId::Pcm,
                time_base: Rational::new(1, SAMPLE_RATE as i32),
                format: TrackFormat::Audio {
                    sample_rate: SAMPLE_RATE,
                    channels: 1,
                    sample_format: Some(SampleFormat::S16),
                },
                duration: (!self.unknown_length)
                    .then(|| Duration::from_secs_f64(samples as f64 / SAMPLE_RATE as f64)),
                frame_count: None,
            });
        }

        let duration = match self.video.first() {
            Some(frames) if !self.unknown_length => span(frames),
            _ => Duration::ZERO,
        };
        SourceMedia::new(locator, duration, tracks)
    }
}

/**
    What a writer received. `finished` is set once the container was finalized.
*/
#[derive(Clone, Debug, Default)]
pub struct Recording {
    pub config: Option<WriterConfig>,
    pub video: Vec<VideoFrame>,
    pub audio: Vec<AudioFrame>,
    pub finished: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Faults {
    pub open_video: bool,
    pub create_writer: bool,
    pub write_video_at: Option<usize>,
    pub write_audio_at: Option<usize>,
    /// Index of the source audio frame whose decode fails.
    pub audio_read_at: Option<usize>,
    /// Delay per decoded frame, video and audio.
    pub read_delay: Option<Duration>,
}

#[derive(Default)]
struct Shared {
    sources: Mutex<HashMap<PathBuf, Synthetic>>,
    outputs: Mutex<HashMap<PathBuf, Recording>>,
    faults: Mutex<Faults>,
    probes: AtomicUsize,
    audio_opens: AtomicUsize,
    writers: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: impl Into<PathBuf>, source: Synthetic) {
        self.shared.sources.lock().insert(path.into(), source);
    }

    pub fn set_faults(&self, faults: Faults) {
        *self.shared.faults.lock() = faults;
    }

    pub fn output(&self, path: impl AsRef<Path>) -> Option<Recording> {
        self.shared.outputs.lock().get(path.as_ref()).cloned()
    }

    pub fn probes(&self) -> usize {
        self.shared.probes.load(Ordering::SeqCst)
    }

    pub fn audio_opens(&self) -> usize {
        self.shared.audio_opens.load(Ordering::SeqCst)
    }

    pub fn writers(&self) -> usize {
        self.shared.writers.load(Ordering::SeqCst)
    }

    pub fn as_backend(&self) -> Arc<dyn MediaBackend> {
        Arc::new(self.clone())
    }

    fn source(&self, locator: &Path) -> Result<Synthetic> {
        self.shared
            .sources
            .lock()
            .get(locator)
            .cloned()
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} is not registered", locator.display()),
                ))
            })
    }

    fn ordinal(source: &SourceMedia, track: &Track) -> usize {
        source
            .tracks
            .iter()
            .filter(|t| t.kind == track.kind && t.index < track.index)
            .count()
    }
}

impl MediaBackend for MemoryBackend {
    fn probe(&self, locator: &Path) -> Result<SourceMedia> {
        self.shared.probes.fetch_add(1, Ordering::SeqCst);
        Ok(self.source(locator)?.describe(locator))
    }

    fn open_video(&self, source: &SourceMedia, track: &Track) -> Result<Box<dyn VideoReader>> {
        let faults = self.shared.faults.lock().clone();
        if faults.open_video {
            return Err(Error::codec("video decoder refused to open"));
        }
        let synthetic = self.source(source.locator())?;
        let frames = synthetic
            .video
            .get(Self::ordinal(source, track))
            .cloned()
            .ok_or(Error::NoSuchStream { index: track.index })?;
        Ok(Box::new(Reader::new(frames, faults.read_delay, None)))
    }

    fn open_audio(&self, source: &SourceMedia, track: &Track) -> Result<Box<dyn AudioReader>> {
        self.shared.audio_opens.fetch_add(1, Ordering::SeqCst);
        let faults = self.shared.faults.lock().clone();
        let synthetic = self.source(source.locator())?;
        let frames = synthetic
            .audio
            .get(Self::ordinal(source, track))
            .cloned()
            .ok_or(Error::NoSuchStream { index: track.index })?;
        Ok(Box::new(Reader::new(
            frames,
            faults.read_delay,
            faults.audio_read_at,
        )))
    }

    fn create_writer(&self, locator: &Path, config: &WriterConfig) -> Result<Box<dyn MediaWriter>> {
        self.shared.writers.fetch_add(1, Ordering::SeqCst);
        let faults = self.shared.faults.lock().clone();
        if faults.create_writer {
            return Err(Error::codec("muxer refused to open"));
        }
        Ok(Box::new(RecordingWriter {
            path: locator.to_path_buf(),
            shared: Arc::clone(&self.shared),
            recording: Recording {
                config: Some(config.clone()),
                ..Recording::default()
            },
            fail_video_at: faults.write_video_at,
            fail_audio_at: faults.write_audio_at,
        }))
    }
}

struct Reader<T> {
    frames: VecDeque<T>,
    delay: Option<Duration>,
    fail_at: Option<usize>,
    read: usize,
}

impl<T> Reader<T> {
    fn new(frames: Vec<T>, delay: Option<Duration>, fail_at: Option<usize>) -> Self {
        Self {
            frames: frames.into(),
            delay,
            fail_at,
            read: 0,
        }
    }

    fn pop(&mut self) -> Result<Option<T>> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail_at == Some(self.read) {
            return Err(Error::codec("decoder rejected packet"));
        }
        self.read += 1;
        Ok(self.frames.pop_front())
    }
}

impl VideoReader for Reader<VideoFrame> {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        self.pop()
    }
}

impl AudioReader for Reader<AudioFrame> {
    fn next_frame(&mut self) -> Result<Option<AudioFrame>> {
        self.pop()
    }
}

struct RecordingWriter {
    path: PathBuf,
    shared: Arc<Shared>,
    recording: Recording,
    fail_video_at: Option<usize>,
    fail_audio_at: Option<usize>,
}

impl MediaWriter for RecordingWriter {
    fn write_video(&mut self, frame: &VideoFrame) -> Result<()> {
        if self.fail_video_at == Some(self.recording.video.len()) {
            return Err(Error::codec("encoder rejected frame"));
        }
        if let Some(last) = self.recording.video.last() {
            if frame.pts <= last.pts {
                return Err(Error::invalid_data("video timestamps must increase"));
            }
        }
        self.recording.video.push(frame.clone());
        Ok(())
    }

    fn write_audio(&mut self, frame: &AudioFrame) -> Result<()> {
        let has_audio = self
            .recording
            .config
            .as_ref()
            .is_some_and(|c| c.audio.is_some());
        if !has_audio {
            return Err(Error::invalid_data("writer has no audio stream"));
        }
        if self.fail_audio_at == Some(self.recording.audio.len()) {
            return Err(Error::codec("encoder rejected samples"));
        }
        if let Some(last) = self.recording.audio.last() {
            if frame.pts <= last.pts {
                return Err(Error::invalid_data("audio timestamps must increase"));
            }
        }
        self.recording.audio.push(frame.clone());
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let Self {
            path,
            shared,
            mut recording,
            ..
        } = *self;
        recording.finished = true;

        let mut source = Synthetic::new().with_video(recording.video.clone());
        if !recording.audio.is_empty() {
            source = source.with_audio(recording.audio.clone());
        }
        shared.sources.lock().insert(path.clone(), source);
        shared.outputs.lock().insert(path, recording);
        Ok(())
    }
}
