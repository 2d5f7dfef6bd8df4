/*!
    Sink configuration types.
*/

use std::path::Path;

/**
    Container format for output.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerFormat {
    /// MP4 container (most compatible).
    Mp4,
    /// QuickTime container.
    Mov,
    /// Matroska container (most flexible).
    Mkv,
}

impl ContainerFormat {
    /**
        Get the FFmpeg format name for this container.
    */
    pub fn ffmpeg_format_name(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Mkv => "matroska",
        }
    }

    /**
        Get the typical file extension for this container.
    */
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Mkv => "mkv",
        }
    }

    /**
        Guess the container from a file extension (case-insensitive).
    */
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "mp4" | "m4v" => Some(Self::Mp4),
            "mov" | "qt" => Some(Self::Mov),
            "mkv" => Some(Self::Mkv),
            _ => None,
        }
    }

    /**
        Whether the muxer understands the `faststart` movflag.
    */
    pub fn supports_fast_start(&self) -> bool {
        matches!(self, Self::Mp4 | Self::Mov)
    }
}

/**
    Configuration for a media sink.
*/
#[derive(Clone, Debug)]
pub struct SinkConfig {
    /// Container format to use.
    pub format: ContainerFormat,
    /// Enable "fast start" for MP4/MOV (moves moov atom to beginning).
    pub fast_start: bool,
}

impl SinkConfig {
    /**
        Create a new sink configuration.
    */
    pub fn new(format: ContainerFormat) -> Self {
        Self {
            format,
            fast_start: true,
        }
    }

    /**
        Create configuration for MP4 output.
    */
    pub fn mp4() -> Self {
        Self::new(ContainerFormat::Mp4)
    }

    /**
        Create configuration for MOV output.
    */
    pub fn mov() -> Self {
        Self::new(ContainerFormat::Mov)
    }

    /**
        Create configuration for MKV output.
    */
    pub fn mkv() -> Self {
        Self::new(ContainerFormat::Mkv)
    }

    /**
        Pick the container from the output path, falling back to MP4.
    */
    pub fn for_path(path: &Path) -> Self {
        Self::new(ContainerFormat::from_path(path).unwrap_or(ContainerFormat::Mp4))
    }

    /**
        Enable or disable fast start for MP4.
    */
    pub fn with_fast_start(mut self, enabled: bool) -> Self {
        self.fast_start = enabled;
        self
    }
}
