/*!
    Codec identification.
*/

use serde::{Deserialize, Serialize};

/**
    Codec identifiers.

    A subset of codecs commonly found in source files; anything else
    is reported as [`CodecId::Other`].
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CodecId {
    // Video codecs
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    H265,
    /// VP8
    Vp8,
    /// VP9
    Vp9,
    /// AV1
    Av1,
    /// MPEG-4 Part 2
    Mpeg4,
    /// Apple ProRes
    ProRes,
    /// Motion JPEG
    Mjpeg,
    /// FFV1 lossless
    Ffv1,
    /// Uncompressed video
    RawVideo,

    // Audio codecs
    /// AAC (Advanced Audio Coding)
    Aac,
    /// Opus
    Opus,
    /// MP3 (MPEG Audio Layer 3)
    Mp3,
    /// FLAC (Free Lossless Audio Codec)
    Flac,
    /// Linear PCM in any layout
    Pcm,

    /// Anything not listed above
    Other,
}

impl CodecId {
    /**
        Map an FFmpeg-style codec name (e.g. `"h264"`, `"pcm_s16le"`).
    */
    pub fn from_name(name: &str) -> Self {
        match name {
            "h264" => Self::H264,
            "hevc" | "h265" => Self::H265,
            "vp8" => Self::Vp8,
            "vp9" => Self::Vp9,
            "av1" => Self::Av1,
            "mpeg4" => Self::Mpeg4,
            "prores" => Self::ProRes,
            "mjpeg" => Self::Mjpeg,
            "ffv1" => Self::Ffv1,
            "rawvideo" => Self::RawVideo,
            "aac" => Self::Aac,
            "opus" => Self::Opus,
            "mp3" => Self::Mp3,
            "flac" => Self::Flac,
            n if n.starts_with("pcm_") => Self::Pcm,
            _ => Self::Other,
        }
    }

    /**
        Returns true if this is a video codec.
    */
    pub const fn is_video(self) -> bool {
        matches!(
            self,
            Self::H264
                | Self::H265
                | Self::Vp8
                | Self::Vp9
                | Self::Av1
                | Self::Mpeg4
                | Self::ProRes
                | Self::Mjpeg
                | Self::Ffv1
                | Self::RawVideo
        )
    }

    /**
        Returns true if this is an audio codec.
    */
    pub const fn is_audio(self) -> bool {
        matches!(
            self,
            Self::Aac | Self::Opus | Self::Mp3 | Self::Flac | Self::Pcm
        )
    }

    /**
        Returns true if every frame of this codec decodes on its own.

        For intra-only codecs each frame is its own dependency run, so the
        reversal plan never needs to hold more than one frame per run.
        Unknown codecs are assumed to carry inter-frame dependencies.
    */
    pub const fn is_intra_only(self) -> bool {
        matches!(
            self,
            Self::ProRes | Self::Mjpeg | Self::Ffv1 | Self::RawVideo
        )
    }
}
