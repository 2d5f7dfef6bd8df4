/*!
    Export configuration.
*/

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use revid_types::EncoderSettings;

/// Decoded-size budget above which frames are staged to disk.
pub const DEFAULT_MEMORY_LIMIT: u64 = 512 * 1024 * 1024;

/// Longest dependency run kept in one read window.
pub const DEFAULT_MAX_RUN_FRAMES: usize = 300;

/**
    Where buffered video frames live while the reversal plan is walked.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArenaKind {
    /// Every decoded frame stays in memory.
    Memory,
    /// Frames are written to a scratch file and read back one run at a time.
    Staged,
}

/**
    Controls how much decoded video is held in memory.
*/
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPolicy {
    /// Estimated decoded size (bytes) at or below which frames stay in memory,
    /// and the most decoded video held in memory at any time otherwise.
    pub memory_limit: u64,
    /// Directory for staged frames and the intermediate audio store.
    pub staging_dir: Option<PathBuf>,
    /// Upper bound on frames in one dependency run.
    pub max_run_frames: usize,
    /// Use this arena regardless of the size estimate.
    pub force: Option<ArenaKind>,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            staging_dir: None,
            max_run_frames: DEFAULT_MAX_RUN_FRAMES,
            force: None,
        }
    }
}

impl BufferPolicy {
    /**
        Pick the arena for a video whose decoded size is estimated at
        `estimated_bytes`. A size that cannot be estimated is staged.
    */
    pub fn choose(&self, estimated_bytes: Option<u64>) -> ArenaKind {
        match (self.force, estimated_bytes) {
            (Some(kind), _) => kind,
            (None, Some(bytes)) if bytes <= self.memory_limit => ArenaKind::Memory,
            (None, _) => ArenaKind::Staged,
        }
    }

    /**
        Bytes a memory arena may hold before it moves to disk, or `None`
        when memory was forced.
    */
    pub fn spill_limit(&self) -> Option<u64> {
        match self.force {
            Some(ArenaKind::Memory) => None,
            _ => Some(self.memory_limit),
        }
    }

    /**
        Directory scratch files are created in.
    */
    pub fn scratch_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = bytes;
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn with_max_run_frames(mut self, frames: usize) -> Self {
        self.max_run_frames = frames.max(1);
        self
    }

    pub fn with_force(mut self, kind: ArenaKind) -> Self {
        self.force = Some(kind);
        self
    }
}

/**
    Configuration of one [`FrameReversalEngine`](crate::FrameReversalEngine).

    Encoder settings are passed to the writer uninterpreted.
*/
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Output file. Exports fail with `MissingOutput` while this is unset.
    pub output: Option<PathBuf>,
    /// Write a video-only output even when the source has audio.
    pub skip_audio: bool,
    /// Log per-phase diagnostics at debug instead of trace level.
    pub show_debug: bool,
    /// Settings for the video encoder.
    pub video_settings: EncoderSettings,
    /// Settings for the audio encoder.
    pub audio_settings: EncoderSettings,
    /// Frame buffering policy.
    pub buffer: BufferPolicy,
}

impl ExportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /**
        Output location, if one is set.
    */
    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_skip_audio(mut self, skip: bool) -> Self {
        self.skip_audio = skip;
        self
    }

    pub fn with_show_debug(mut self, enabled: bool) -> Self {
        self.show_debug = enabled;
        self
    }

    pub fn with_video_settings(mut self, settings: EncoderSettings) -> Self {
        self.video_settings = settings;
        self
    }

    pub fn with_audio_settings(mut self, settings: EncoderSettings) -> Self {
        self.audio_settings = settings;
        self
    }

    pub fn with_buffer_policy(mut self, policy: BufferPolicy) -> Self {
        self.buffer = policy;
        self
    }
}
