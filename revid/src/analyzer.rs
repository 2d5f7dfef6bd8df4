/*!
    Source probing and readiness.
*/

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use revid_types::{Error, MediaBackend, Result, SourceMedia};

/**
    Probes a source once and answers metadata queries about it.

    Every query returns a neutral value (zero, `None`, `false`) until
    [`SourceAnalyzer::load`] has succeeded.
*/
pub struct SourceAnalyzer {
    locator: PathBuf,
    backend: Arc<dyn MediaBackend>,
    media: RwLock<Option<Arc<SourceMedia>>>,
}

impl SourceAnalyzer {
    pub fn new(locator: impl Into<PathBuf>, backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            locator: locator.into(),
            backend,
            media: RwLock::new(None),
        }
    }

    pub fn locator(&self) -> &Path {
        &self.locator
    }

    /**
        Probe the source on the blocking pool. Later calls return the
        cached description.

        # Panics

        Panics if called outside of a Tokio runtime.
    */
    pub async fn load(&self) -> Result<Arc<SourceMedia>> {
        if let Some(media) = self.media() {
            return Ok(media);
        }

        let backend = Arc::clone(&self.backend);
        let locator = self.locator.clone();
        let probed = tokio::task::spawn_blocking(move || backend.probe(&locator))
            .await
            .map_err(|e| Error::codec(format!("probe task failed: {e}")))??;

        Ok(self.store(probed))
    }

    /**
        Probe on the current thread. For callers already off the async
        executor.
    */
    pub fn load_blocking(&self) -> Result<Arc<SourceMedia>> {
        if let Some(media) = self.media() {
            return Ok(media);
        }

        let probed = self.backend.probe(&self.locator)?;
        Ok(self.store(probed))
    }

    fn store(&self, probed: SourceMedia) -> Arc<SourceMedia> {
        let mut slot = self.media.write();
        // a concurrent load may have finished first; keep the first result
        let media = slot.get_or_insert_with(|| Arc::new(probed));

        tracing::debug!(
            target: "revid::analyzer",
            locator = %self.locator.display(),
            video = media.video_tracks().count(),
            audio = media.audio_tracks().count(),
            duration = ?media.duration,
            "source ready"
        );

        Arc::clone(media)
    }

    /**
        The probed description, once ready.
    */
    pub fn media(&self) -> Option<Arc<SourceMedia>> {
        self.media.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.media.read().is_some()
    }

    pub fn video_track_count(&self) -> usize {
        self.media().map_or(0, |m| m.video_tracks().count())
    }

    pub fn audio_track_count(&self) -> usize {
        self.media().map_or(0, |m| m.audio_tracks().count())
    }

    pub fn duration(&self) -> Duration {
        self.media().map_or(Duration::ZERO, |m| m.duration)
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration().as_secs_f64()
    }

    /**
        Highest nominal frame rate among the video tracks, in frames per second.
    */
    pub fn max_frame_rate(&self) -> f64 {
        self.media().map_or(0.0, |m| m.max_frame_rate())
    }

    /**
        Natural `(width, height)` of the first video track.
    */
    pub fn natural_size(&self) -> Option<(u32, u32)> {
        self.media().and_then(|m| m.natural_size())
    }
}

impl std::fmt::Debug for SourceAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceAnalyzer")
            .field("locator", &self.locator)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}
