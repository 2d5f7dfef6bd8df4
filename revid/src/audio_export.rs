/*!
    Audio track export into the intermediate store.
*/

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use revid_types::{AudioFrame, MediaBackend, Pts, SourceMedia, Track};

use crate::error::ReverseError;
use crate::store::{AudioStoreWriter, DEFAULT_FRAMES_PER_UNIT, StoreLayout};

/**
    Outcome of a finished audio export.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioExportSummary {
    /// Where the store was written.
    pub path: PathBuf,
    /// Layout of the stored samples.
    pub layout: StoreLayout,
    /// Audio frames stored (one sample per channel each).
    pub frames: u64,
    /// Source timestamp of the first stored frame, in the store time base.
    pub start: Pts,
}

impl AudioExportSummary {
    /**
        Source timestamp just past the last stored frame, in the store
        time base.
    */
    pub fn end(&self) -> Pts {
        Pts(self.start.0.saturating_add(self.frames as i64))
    }
}

/**
    Decodes one audio track of a loaded source into an intermediate store,
    in original order.

    One export runs at a time per exporter; clones share the same guard.
*/
#[derive(Clone)]
pub struct AudioTrackExporter {
    source: Arc<SourceMedia>,
    backend: Arc<dyn MediaBackend>,
    track_index: usize,
    frames_per_unit: u32,
    show_debug: bool,
    exporting: Arc<AtomicBool>,
}

impl AudioTrackExporter {
    /**
        `track_index` counts audio tracks only: 0 is the first audio track.
    */
    pub fn new(source: Arc<SourceMedia>, backend: Arc<dyn MediaBackend>, track_index: usize) -> Self {
        Self {
            source,
            backend,
            track_index,
            frames_per_unit: DEFAULT_FRAMES_PER_UNIT,
            show_debug: false,
            exporting: Arc::new(AtomicBool::new(false)),
        }
    }

    /**
        Audio frames per store unit.
    */
    pub fn with_frames_per_unit(mut self, frames: u32) -> Self {
        self.frames_per_unit = frames.max(1);
        self
    }

    pub fn with_show_debug(mut self, enabled: bool) -> Self {
        self.show_debug = enabled;
        self
    }

    pub fn track_index(&self) -> usize {
        self.track_index
    }

    /**
        True only while an export is running.
    */
    pub fn is_exporting(&self) -> bool {
        self.exporting.load(Ordering::Acquire)
    }

    /**
        Export the track to a store at `output`, on the blocking pool.

        # Panics

        Panics if called outside of a Tokio runtime.
    */
    pub async fn export(&self, output: impl Into<PathBuf>) -> Result<AudioExportSummary, ReverseError> {
        let guard = ExportGuard::acquire(&self.exporting)?;
        let track = self.track()?;

        let this = self.clone();
        let output = output.into();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            this.run(&track, &output)
        })
        .await
        .map_err(|e| {
            ReverseError::audio_frame(0, revid_types::Error::codec(format!("export task failed: {e}")))
        })?
    }

    /**
        Export the track to a store at `output` on the current thread.
    */
    pub fn export_blocking(&self, output: &Path) -> Result<AudioExportSummary, ReverseError> {
        let _guard = ExportGuard::acquire(&self.exporting)?;
        let track = self.track()?;
        self.run(&track, output)
    }

    fn track(&self) -> Result<Track, ReverseError> {
        self.source
            .audio_track(self.track_index)
            .cloned()
            .ok_or_else(|| ReverseError::InvalidTrackIndex {
                index: self.track_index,
                available: self.source.audio_tracks().count(),
            })
    }

    fn run(&self, track: &Track, output: &Path) -> Result<AudioExportSummary, ReverseError> {
        let cannot_add_input = |source| ReverseError::CannotAddInput {
            index: self.track_index,
            source,
        };

        let mut reader = self
            .backend
            .open_audio(&self.source, track)
            .map_err(cannot_add_input)?;

        // the first decoded frame is authoritative for the store layout
        let first = reader
            .next_frame()
            .map_err(|e| ReverseError::audio_frame(0, e))?;
        let layout = match &first {
            Some(frame) => StoreLayout::for_frame(frame, self.frames_per_unit),
            None => StoreLayout {
                format: track_sample_format(track),
                channels: track.channels().unwrap_or(1).max(1),
                sample_rate: track.sample_rate().unwrap_or(48_000).max(1),
                frames_per_unit: self.frames_per_unit,
            },
        };

        let start = first.as_ref().map_or(Pts(0), |frame| {
            frame.pts.rescale(frame.time_base, layout.time_base())
        });

        let mut store =
            AudioStoreWriter::create(output, layout).map_err(ReverseError::CannotAddOutput)?;
        crate::diag!(
            self.show_debug,
            target: "revid::audio",
            track = self.track_index,
            path = %output.display(),
            ?layout,
            start = start.0,
            "exporting audio track"
        );

        if let Some(frame) = first {
            self.process_frame(&mut store, &frame)?;
        }
        while let Some(frame) = reader
            .next_frame()
            .map_err(|e| ReverseError::audio_frame(store.frames_written(), e))?
        {
            self.process_frame(&mut store, &frame)?;
        }

        let frames = store.finish()?;
        crate::diag!(
            self.show_debug,
            target: "revid::audio",
            track = self.track_index,
            frames,
            "audio track exported"
        );

        Ok(AudioExportSummary {
            path: output.to_path_buf(),
            layout,
            frames,
            start,
        })
    }

    /**
        Append one decoded frame to the store. The first failure ends the
        export; nothing already written is repaired.
    */
    pub fn process_frame(
        &self,
        store: &mut AudioStoreWriter,
        frame: &AudioFrame,
    ) -> Result<(), ReverseError> {
        store.write_frame(frame).map_err(|e| {
            tracing::warn!(
                target: "revid::audio",
                track = self.track_index,
                position = store.frames_written(),
                "audio frame rejected: {e}"
            );
            ReverseError::AudioStore(e)
        })
    }
}

impl std::fmt::Debug for AudioTrackExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioTrackExporter")
            .field("source", &self.source.locator)
            .field("track_index", &self.track_index)
            .field("frames_per_unit", &self.frames_per_unit)
            .field("exporting", &self.is_exporting())
            .finish_non_exhaustive()
    }
}

fn track_sample_format(track: &Track) -> revid_types::SampleFormat {
    match track.format {
        revid_types::TrackFormat::Audio {
            sample_format: Some(format),
            ..
        } => format,
        _ => revid_types::SampleFormat::F32,
    }
}

/**
    Holds the exporting flag for the duration of one export.
*/
struct ExportGuard(Arc<AtomicBool>);

impl ExportGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, ReverseError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ReverseError::ExportInProgress)?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
