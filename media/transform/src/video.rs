/*!
    Video frame packing and pixel format conversion.
*/

use ffmpeg_next::{
    format::Pixel,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    util::frame::video::Video as FfmpegVideo,
};

use revid_types::{Error, PixelFormat, Result, VideoFrame};

/**
    Scaling algorithm used when a conversion also changes dimensions.

    Pure pixel-format conversions are unaffected by this choice.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScalingAlgorithm {
    /// Fast, lowest quality
    Point,
    /// Good default
    #[default]
    Bilinear,
    /// Sharper, slower
    Bicubic,
}

impl ScalingAlgorithm {
    fn flags(self) -> ScalingFlags {
        match self {
            Self::Point => ScalingFlags::POINT,
            Self::Bilinear => ScalingFlags::BILINEAR,
            Self::Bicubic => ScalingFlags::BICUBIC,
        }
    }
}

/**
    Map a revid pixel format to FFmpeg's.
*/
pub fn pixel_format_to_ffmpeg(format: PixelFormat) -> Pixel {
    match format {
        PixelFormat::Yuv420p => Pixel::YUV420P,
        PixelFormat::Rgba => Pixel::RGBA,
        PixelFormat::Gray8 => Pixel::GRAY8,
        _ => Pixel::None,
    }
}

/**
    Byte width and row count of every plane of a tightly packed frame.
*/
pub fn plane_layout(format: PixelFormat, width: u32, height: u32) -> Vec<(usize, usize)> {
    let (w, h) = (width as usize, height as usize);
    match format {
        PixelFormat::Yuv420p => {
            let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
            vec![(w, h), (cw, ch), (cw, ch)]
        }
        PixelFormat::Rgba => vec![(w * 4, h)],
        PixelFormat::Gray8 => vec![(w, h)],
        _ => Vec::new(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ScalerKey {
    src: Pixel,
    src_width: u32,
    src_height: u32,
    dst: Pixel,
    dst_width: u32,
    dst_height: u32,
}

struct Scaler {
    key: ScalerKey,
    context: ScalingContext,
}

// SAFETY: the SwsContext is owned exclusively by this wrapper and is only
// ever used through `&mut self`, so moving it to another thread is sound.
unsafe impl Send for Scaler {}

/**
    Converts between FFmpeg frames and tightly packed revid frames.

    The scaling context is created lazily and rebuilt whenever the input or
    output geometry changes.
*/
pub struct VideoTransform {
    algorithm: ScalingAlgorithm,
    scaler: Option<Scaler>,
}

impl VideoTransform {
    pub fn new(algorithm: ScalingAlgorithm) -> Self {
        Self {
            algorithm,
            scaler: None,
        }
    }

    /**
        Convert a decoded FFmpeg frame to `format` at its own dimensions and
        copy it into a buffer without row padding.
    */
    pub fn pack(&mut self, src: &FfmpegVideo, format: PixelFormat) -> Result<Vec<u8>> {
        let target = pixel_format_to_ffmpeg(format);
        if target == Pixel::None {
            return Err(Error::unsupported_format(format!("{format:?}")));
        }

        if src.format() == target {
            return Ok(copy_planes(src, format));
        }

        let key = ScalerKey {
            src: src.format(),
            src_width: src.width(),
            src_height: src.height(),
            dst: target,
            dst_width: src.width(),
            dst_height: src.height(),
        };
        let mut converted = FfmpegVideo::empty();
        self.scaler(key)?
            .run(src, &mut converted)
            .map_err(|e| Error::codec(format!("pixel conversion failed: {e}")))?;

        Ok(copy_planes(&converted, format))
    }

    /**
        Build an FFmpeg frame from a packed revid frame, converted to
        `target` at `width`x`height`. The PTS is left unset.
    */
    pub fn unpack(
        &mut self,
        frame: &VideoFrame,
        target: Pixel,
        width: u32,
        height: u32,
    ) -> Result<FfmpegVideo> {
        if frame.data.len() != frame.expected_data_len() {
            return Err(Error::invalid_data(format!(
                "frame holds {} bytes, expected {}",
                frame.data.len(),
                frame.expected_data_len()
            )));
        }

        let source = pixel_format_to_ffmpeg(frame.format);
        let mut staged = FfmpegVideo::new(source, frame.width, frame.height);
        fill_planes(&mut staged, &frame.data, frame.format);

        if source == target && frame.width == width && frame.height == height {
            return Ok(staged);
        }

        let key = ScalerKey {
            src: source,
            src_width: frame.width,
            src_height: frame.height,
            dst: target,
            dst_width: width,
            dst_height: height,
        };
        let mut converted = FfmpegVideo::empty();
        self.scaler(key)?
            .run(&staged, &mut converted)
            .map_err(|e| Error::codec(format!("pixel conversion failed: {e}")))?;

        Ok(converted)
    }

    fn scaler(&mut self, key: ScalerKey) -> Result<&mut ScalingContext> {
        let stale = self.scaler.as_ref().is_none_or(|s| s.key != key);
        if stale {
            let context = ScalingContext::get(
                key.src,
                key.src_width,
                key.src_height,
                key.dst,
                key.dst_width,
                key.dst_height,
                self.algorithm.flags(),
            )
            .map_err(|e| Error::codec(format!("cannot create scaler: {e}")))?;
            self.scaler = Some(Scaler { key, context });
        }

        match self.scaler.as_mut() {
            Some(scaler) => Ok(&mut scaler.context),
            None => Err(Error::codec("scaler unavailable")),
        }
    }
}

impl Default for VideoTransform {
    fn default() -> Self {
        Self::new(ScalingAlgorithm::default())
    }
}

impl std::fmt::Debug for VideoTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoTransform")
            .field("algorithm", &self.algorithm)
            .field("scaler", &self.scaler.as_ref().map(|s| s.key))
            .finish()
    }
}

/**
    Copy every plane of `src` row by row, dropping the stride padding.
*/
fn copy_planes(src: &FfmpegVideo, format: PixelFormat) -> Vec<u8> {
    let layout = plane_layout(format, src.width(), src.height());
    let mut out = Vec::with_capacity(format.frame_len(src.width(), src.height()));

    for (plane, (row_bytes, rows)) in layout.into_iter().enumerate() {
        let stride = src.stride(plane);
        let data = src.data(plane);
        for row in 0..rows {
            let start = row * stride;
            out.extend_from_slice(&data[start..start + row_bytes]);
        }
    }

    out
}

/**
    Inverse of [`copy_planes`]: spread packed rows over the frame's strides.
*/
fn fill_planes(dst: &mut FfmpegVideo, data: &[u8], format: PixelFormat) {
    let layout = plane_layout(format, dst.width(), dst.height());
    let mut offset = 0;

    for (plane, (row_bytes, rows)) in layout.into_iter().enumerate() {
        let stride = dst.stride(plane);
        let plane_data = dst.data_mut(plane);
        for row in 0..rows {
            let start = row * stride;
            plane_data[start..start + row_bytes].copy_from_slice(&data[offset..offset + row_bytes]);
            offset += row_bytes;
        }
    }
}
