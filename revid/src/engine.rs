/*!
    The reversal engine.

    An export runs these steps on the blocking pool:

    1. Probe the source (skipped when it is already loaded)
    2. Open the first video track and read it forward once, recording the
       reversal plan and buffering every frame
    3. Open the writer
    4. Export the first audio track to an intermediate store, unless audio
       is skipped or absent
    5. Write reversed video and reversed audio, interleaved by output time
    6. Finalize the container

    Any failure ends the export before the container is finalized.
*/

use std::future::{Future, IntoFuture};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use revid_types::{
    AudioOutput, MediaBackend, MediaWriter, PixelFormat, Pts, Rational, SampleFormat,
    SourceMedia, Track, TrackFormat, VideoOutput, VideoReader, WriterConfig,
};

use crate::analyzer::SourceAnalyzer;
use crate::audio_export::{AudioExportSummary, AudioTrackExporter};
use crate::config::{ArenaKind, ExportConfig};
use crate::error::{ExportResult, ReverseError};
use crate::plan::{FrameArena, PlanBuilder, ReversalPlan, estimate_decoded_bytes};
use crate::progress::{Operation, Progress, ProgressReporter};
use crate::store::{AudioStoreReader, ReverseAudioUnits, StoreError};

/// Layout the backends decode video into.
const DECODED_FORMAT: PixelFormat = PixelFormat::Yuv420p;

/**
    What a successful export produced.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportSummary {
    /// The finalized output file.
    pub output: PathBuf,
    /// Video frames written.
    pub video_frames: usize,
    /// Audio frames written (one sample per channel each).
    pub audio_frames: u64,
    /// Span of the reversed video.
    pub duration: Duration,
    /// Where frames were buffered.
    pub arena: ArenaKind,
}

/**
    Lifecycle of a [`FrameReversalEngine`].
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Probing,
    Ready,
    Exporting,
    Succeeded,
    Failed,
}

impl EngineState {
    /**
        Whether a new export would be rejected.
    */
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Probing | Self::Exporting)
    }

    fn to_token(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Probing => 1,
            Self::Ready => 2,
            Self::Exporting => 3,
            Self::Succeeded => 4,
            Self::Failed => 5,
        }
    }

    fn from_token(token: u8) -> Self {
        match token {
            0 => Self::Created,
            1 => Self::Probing,
            2 => Self::Ready,
            3 => Self::Exporting,
            4 => Self::Succeeded,
            _ => Self::Failed,
        }
    }
}

/**
    Reverses the video and audio of one source file into a new file.

    Cloning the engine shares it; at most one export runs at a time across
    all clones and any further request is rejected with
    [`ReverseError::ExportInProgress`] rather than queued.
*/
#[derive(Clone)]
pub struct FrameReversalEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    analyzer: SourceAnalyzer,
    backend: Arc<dyn MediaBackend>,
    config: ExportConfig,
    state: AtomicU8,
}

impl FrameReversalEngine {
    pub fn new(
        source: impl Into<PathBuf>,
        config: ExportConfig,
        backend: Arc<dyn MediaBackend>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                analyzer: SourceAnalyzer::new(source, Arc::clone(&backend)),
                backend,
                config,
                state: AtomicU8::new(EngineState::Created.to_token()),
            }),
        }
    }

    /**
        Engine backed by FFmpeg.
    */
    #[cfg(feature = "ffmpeg")]
    pub fn with_ffmpeg(source: impl Into<PathBuf>, config: ExportConfig) -> Self {
        Self::new(source, config, Arc::new(crate::FfmpegBackend::new()))
    }

    pub fn config(&self) -> &ExportConfig {
        &self.inner.config
    }

    /**
        Metadata of the source; ready after [`load`](Self::load) or the
        first export has probed it.
    */
    pub fn analyzer(&self) -> &SourceAnalyzer {
        &self.inner.analyzer
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_token(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_exporting(&self) -> bool {
        self.state().is_busy()
    }

    /**
        Probe the source ahead of an export.
    */
    pub async fn load(&self) -> Result<Arc<SourceMedia>, ReverseError> {
        if let Some(media) = self.inner.analyzer.media() {
            return Ok(media);
        }

        let previous = self.inner.begin(EngineState::Probing)?;
        match self.inner.analyzer.load().await {
            Ok(media) => {
                self.inner.set_state(EngineState::Ready);
                Ok(media)
            }
            Err(e) => {
                self.inner.set_state(previous);
                Err(ReverseError::UnableToStartReader(e))
            }
        }
    }

    /**
        Start an export and return a handle to its progress and result.

        Configuration problems and a busy engine are reported through the
        handle right away; no work is started for them.

        # Panics

        Panics if called outside of a Tokio runtime.
    */
    pub fn export(&self) -> ExportHandle {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();
        let handle = ExportHandle {
            progress: progress_rx,
            result: result_rx,
        };

        let Some(output) = self.inner.config.output.clone() else {
            tracing::warn!(target: "revid::engine", "export requested without an output location");
            let _ = result_tx.send(Err(ReverseError::MissingOutput));
            return handle;
        };

        let start = if self.inner.analyzer.is_ready() {
            EngineState::Exporting
        } else {
            EngineState::Probing
        };
        if let Err(e) = self.inner.begin(start) {
            tracing::warn!(target: "revid::engine", "export rejected: engine is busy");
            let _ = result_tx.send(Err(e));
            return handle;
        }

        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut slot = ExportSlot {
                inner: &inner,
                succeeded: false,
            };
            let mut progress = ProgressReporter::new(progress_tx);

            let result = inner.run(&output, &mut progress);
            match &result {
                Ok(summary) => tracing::info!(
                    target: "revid::engine",
                    output = %summary.output.display(),
                    frames = summary.video_frames,
                    audio_frames = summary.audio_frames,
                    "export finished"
                ),
                Err(e) => tracing::error!(
                    target: "revid::engine",
                    domain = e.domain(),
                    code = e.code(),
                    "export failed: {e}"
                ),
            }

            slot.succeeded = result.is_ok();
            drop(slot);
            let _ = result_tx.send(result);
        });

        handle
    }

    /**
        Start an export and report through callbacks instead of a handle.

        `on_progress` runs for every update, then `on_complete` runs exactly
        once with the result.

        # Panics

        Panics if called outside of a Tokio runtime.
    */
    pub fn export_with_callbacks<P, C>(&self, mut on_progress: P, on_complete: C)
    where
        P: FnMut(Progress) + Send + 'static,
        C: FnOnce(ExportResult) + Send + 'static,
    {
        let ExportHandle {
            mut progress,
            result,
        } = self.export();

        tokio::spawn(async move {
            while let Some(update) = progress.recv().await {
                on_progress(update);
            }
            on_complete(resolve(result).await);
        });
    }
}

impl std::fmt::Debug for FrameReversalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReversalEngine")
            .field("source", &self.inner.analyzer.locator())
            .field("state", &self.state())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl EngineInner {
    /**
        Move into a busy state unless another operation holds the engine.
        Returns the state that was replaced.
    */
    fn begin(&self, next: EngineState) -> Result<EngineState, ReverseError> {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |token| {
                (!EngineState::from_token(token).is_busy()).then_some(next.to_token())
            })
            .map(EngineState::from_token)
            .map_err(|_| ReverseError::ExportInProgress)
    }

    fn set_state(&self, state: EngineState) {
        self.state.store(state.to_token(), Ordering::Release);
    }

    fn run(&self, output: &Path, progress: &mut ProgressReporter) -> ExportResult {
        let debug = self.config.show_debug;

        let media = match self.analyzer.media() {
            Some(media) => media,
            None => {
                progress.indeterminate(Operation::Probing);
                self.analyzer
                    .load_blocking()
                    .map_err(ReverseError::UnableToStartReader)?
            }
        };
        self.set_state(EngineState::Exporting);

        let Some(track) = media.primary_video().cloned() else {
            return Err(ReverseError::NoSamples);
        };
        if media.video_tracks().count() > 1 {
            crate::diag!(
                debug,
                target: "revid::engine",
                used = track.index,
                "source has several video tracks, only the first is reversed"
            );
        }

        let mut reader = self
            .backend
            .open_video(&media, &track)
            .map_err(ReverseError::UnableToStartReader)?;
        let (plan, mut arena) = self.buffer_video(&media, &track, reader.as_mut(), progress)?;
        drop(reader);

        let audio_track = if self.config.skip_audio {
            None
        } else {
            media.audio_track(0).cloned()
        };

        let writer_config = self.writer_config(&track, &plan, audio_track.as_ref());
        let mut writer = self
            .backend
            .create_writer(output, &writer_config)
            .map_err(ReverseError::UnableToStartWriter)?;

        // removed with everything in it when this export returns
        let scratch = match &audio_track {
            Some(_) => Some(
                tempfile::Builder::new()
                    .prefix("revid-")
                    .tempdir_in(self.config.buffer.scratch_dir())
                    .map_err(|e| ReverseError::CannotAddOutput(StoreError::Io(e)))?,
            ),
            None => None,
        };

        let mut audio = match &scratch {
            Some(dir) => {
                progress.indeterminate(Operation::ExportingAudio);
                let exporter =
                    AudioTrackExporter::new(Arc::clone(&media), Arc::clone(&self.backend), 0)
                        .with_show_debug(debug);
                let summary = exporter.export_blocking(&dir.path().join("audio.rvas"))?;
                let origin = audio_origin(&plan, &summary);
                crate::diag!(
                    debug,
                    target: "revid::engine",
                    origin,
                    frames = summary.frames,
                    "reversing audio"
                );
                Some(
                    AudioStoreReader::open(&summary.path)?
                        .into_reversed()
                        .with_origin(origin),
                )
            }
            None => None,
        };

        let audio_frames =
            self.write_interleaved(&plan, &mut arena, audio.as_mut(), writer.as_mut(), progress)?;

        progress.indeterminate(Operation::Finalizing);
        writer
            .finish()
            .map_err(|e| ReverseError::video_frame(plan.len() as u64, e))?;

        Ok(ExportSummary {
            output: output.to_path_buf(),
            video_frames: plan.len(),
            audio_frames,
            duration: plan.total_duration().to_duration(plan.time_base()),
            arena: arena.kind(),
        })
    }

    /**
        Read the video track forward in full, recording the plan and
        buffering every frame.
    */
    fn buffer_video(
        &self,
        media: &SourceMedia,
        track: &Track,
        reader: &mut dyn VideoReader,
        progress: &mut ProgressReporter,
    ) -> Result<(ReversalPlan, FrameArena), ReverseError> {
        let policy = &self.config.buffer;
        let estimate = estimate_decoded_bytes(track, media.duration, DECODED_FORMAT);
        let kind = policy.choose(estimate);
        let expected_frames = expected_frame_count(track, media.duration);

        crate::diag!(
            self.config.show_debug,
            target: "revid::engine",
            ?estimate,
            ?kind,
            expected_frames,
            "buffering video"
        );

        let mut builder = PlanBuilder::new(policy.max_run_frames, track.codec.is_intra_only());
        let mut arena: Option<FrameArena> = None;
        let staging_dir = policy.scratch_dir();

        loop {
            let position = builder.len() as u64;
            let frame = match reader.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => return Err(ReverseError::video_frame(position, e)),
            };

            builder
                .push(&frame)
                .map_err(|e| ReverseError::video_frame(position, e))?;

            if arena.is_none() {
                let created = FrameArena::new(kind, &staging_dir, frame.data.len())
                    .map_err(|e| ReverseError::video_frame(position, e))?
                    .with_memory_limit(policy.spill_limit());
                arena = Some(created);
            }
            if let Some(slots) = arena.as_mut() {
                slots
                    .push(frame.data)
                    .map_err(|e| ReverseError::video_frame(position, e))?;
            }

            let done = position + 1;
            progress.fraction(Operation::ReadingVideo, done, expected_frames.max(done));
        }

        let (Some(plan), Some(arena)) = (builder.finish(), arena) else {
            return Err(ReverseError::NoSamples);
        };
        progress.fraction(Operation::ReadingVideo, 1, 1);

        crate::diag!(
            self.config.show_debug,
            target: "revid::engine",
            frames = plan.len(),
            runs = plan.runs().len(),
            "reversal plan ready"
        );

        Ok((plan, arena))
    }

    fn writer_config(
        &self,
        track: &Track,
        plan: &ReversalPlan,
        audio: Option<&Track>,
    ) -> WriterConfig {
        let (width, height) = plan.dimensions();
        let frame_rate = track
            .frame_rate()
            .unwrap_or_else(|| estimate_frame_rate(plan));

        WriterConfig {
            video: VideoOutput {
                width,
                height,
                format: plan.format(),
                frame_rate,
                time_base: plan.time_base(),
                settings: self.config.video_settings.clone(),
            },
            audio: audio.map(|track| {
                let (sample_rate, channels, format) = match track.format {
                    TrackFormat::Audio {
                        sample_rate,
                        channels,
                        sample_format,
                    } => (
                        sample_rate.max(1),
                        channels.max(1),
                        sample_format.unwrap_or(SampleFormat::F32),
                    ),
                    TrackFormat::Video { .. } => (48_000, 2, SampleFormat::F32),
                };
                AudioOutput {
                    sample_rate,
                    channels,
                    format,
                    time_base: Rational::new(1, sample_rate as i32),
                    settings: self.config.audio_settings.clone(),
                }
            }),
        }
    }

    /**
        Write reversed video and audio, always taking whichever stream has
        the earlier next output time. Returns the audio frames written.
    */
    fn write_interleaved(
        &self,
        plan: &ReversalPlan,
        arena: &mut FrameArena,
        mut audio: Option<&mut ReverseAudioUnits>,
        writer: &mut dyn MediaWriter,
        progress: &mut ProgressReporter,
    ) -> Result<u64, ReverseError> {
        let total = plan.len() as u64;
        let video_time_base = plan.time_base();
        let mut video = arena.reverse_frames(plan);

        loop {
            let next_video = video.next_pts().map(|pts| pts.to_duration(video_time_base));
            let next_audio = audio.as_deref().and_then(|units| {
                units
                    .next_pts()
                    .map(|pts| pts.to_duration(units.layout().time_base()))
            });

            let take_video = match (next_video, next_audio) {
                (None, None) => break,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (Some(v), Some(a)) => v <= a,
            };

            if take_video {
                let position = video.emitted() as u64;
                let Some(frame) = video.next() else {
                    continue;
                };
                let frame = frame.map_err(|e| ReverseError::video_frame(position, e))?;
                writer
                    .write_video(&frame)
                    .map_err(|e| ReverseError::video_frame(position, e))?;
                progress.fraction(Operation::Writing, position + 1, total);
            } else if let Some(units) = audio.as_deref_mut() {
                let position = units.frames_emitted();
                let Some(unit) = units.next() else {
                    continue;
                };
                writer
                    .write_audio(&unit?)
                    .map_err(|e| ReverseError::audio_frame(position, e))?;
            }
        }

        Ok(audio.map_or(0, |units| units.frames_emitted()))
    }
}

/**
    Marks the end of an export on the engine, also when the worker unwinds.
*/
struct ExportSlot<'a> {
    inner: &'a EngineInner,
    succeeded: bool,
}

impl Drop for ExportSlot<'_> {
    fn drop(&mut self) {
        let state = if self.succeeded {
            EngineState::Succeeded
        } else {
            EngineState::Failed
        };
        self.inner.set_state(state);
    }
}

/**
    Output position of the first reversed audio frame, in store ticks.

    Source time `t` plays at `end - t`, where `end` is where the video
    stops, so audio that ends early starts late and audio that runs past
    the video loses its head.
*/
fn audio_origin(plan: &ReversalPlan, audio: &AudioExportSummary) -> i64 {
    let video_start = plan.frames().first().map_or(Pts(0), |f| f.pts);
    let video_end = Pts(video_start.0 + plan.total_duration().0)
        .rescale(plan.time_base(), audio.layout.time_base());
    video_end.0 - audio.end().0
}

fn expected_frame_count(track: &Track, duration: Duration) -> u64 {
    track.frame_count.unwrap_or_else(|| {
        let rate = track.frame_rate().map_or(0.0, Rational::to_f64);
        let seconds = track.duration.unwrap_or(duration).as_secs_f64();
        (seconds * rate).round() as u64
    })
}

/**
    Frame rate implied by the plan's timing, for tracks that do not report one.
*/
fn estimate_frame_rate(plan: &ReversalPlan) -> Rational {
    let span = plan.total_duration().to_duration(plan.time_base()).as_secs_f64();
    if span <= 0.0 {
        return Rational::new(25, 1);
    }
    let fps = plan.len() as f64 / span;
    Rational::new((fps * 1000.0).round().max(1.0) as i32, 1000)
}

/**
    Progress and result of a running export.

    Awaiting the handle (it implements [`IntoFuture`]) yields the result and
    discards any unread progress.
*/
#[derive(Debug)]
pub struct ExportHandle {
    progress: mpsc::UnboundedReceiver<Progress>,
    result: oneshot::Receiver<ExportResult>,
}

impl ExportHandle {
    /**
        Next progress update; `None` once the export has stopped reporting.
    */
    pub async fn next_progress(&mut self) -> Option<Progress> {
        self.progress.recv().await
    }

    /**
        Next progress update if one is already queued.
    */
    pub fn try_progress(&mut self) -> Option<Progress> {
        self.progress.try_recv().ok()
    }

    /**
        Wait for the export to finish.
    */
    pub async fn wait(self) -> ExportResult {
        resolve(self.result).await
    }
}

impl IntoFuture for ExportHandle {
    type Output = ExportResult;
    type IntoFuture = Pin<Box<dyn Future<Output = ExportResult> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

async fn resolve(result: oneshot::Receiver<ExportResult>) -> ExportResult {
    result.await.unwrap_or_else(|_| {
        Err(ReverseError::video_frame(
            0,
            revid_types::Error::codec("export worker stopped without a result"),
        ))
    })
}
