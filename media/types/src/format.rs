/*!
    Pixel and sample format types.
*/

use serde::{Deserialize, Serialize};

/**
    Pixel layout of a decoded video frame.

    Frames crossing the backend seam are tightly packed (no row padding),
    so every frame of a stream occupies exactly [`PixelFormat::frame_len`]
    bytes. That fixed size is what lets the reversal arena stage frames
    by index.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, 12bpp. Y plane, then U, then V.
    Yuv420p,
    /// Packed RGBA, 32bpp
    Rgba,
    /// Packed 8-bit luma only
    Gray8,
}

impl PixelFormat {
    /**
        Returns the number of bytes one tightly packed frame occupies.

        Chroma planes of 4:2:0 round odd dimensions up.
    */
    pub const fn frame_len(self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            Self::Yuv420p => {
                let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
                w * h + 2 * cw * ch
            }
            Self::Rgba => w * h * 4,
            Self::Gray8 => w * h,
        }
    }

    /**
        Returns true if this is a planar format.
    */
    pub const fn is_planar(self) -> bool {
        matches!(self, Self::Yuv420p)
    }
}

/**
    Audio sample formats.

    Decoded audio is always interleaved; this only names the sample type.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SampleFormat {
    /// 32-bit floating point, range [-1.0, 1.0]
    F32,
    /// 64-bit floating point
    F64,
    /// Signed 16-bit integer
    S16,
    /// Signed 32-bit integer
    S32,
    /// Unsigned 8-bit integer
    U8,
}

impl SampleFormat {
    /**
        Returns the number of bytes per sample.
    */
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16 => 2,
            Self::S32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /**
        Returns true if this is a floating-point format.
    */
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /**
        Stable numeric tag, used by on-disk intermediate formats.
    */
    pub const fn tag(self) -> u8 {
        match self {
            Self::U8 => 1,
            Self::S16 => 2,
            Self::S32 => 3,
            Self::F32 => 4,
            Self::F64 => 5,
        }
    }

    /**
        Inverse of [`SampleFormat::tag`].
    */
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::U8),
            2 => Some(Self::S16),
            3 => Some(Self::S32),
            4 => Some(Self::F32),
            5 => Some(Self::F64),
            _ => None,
        }
    }
}
