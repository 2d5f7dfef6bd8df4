/*!
    Intermediate audio store.

    A flat file holding one decoded audio track as interleaved PCM, cut into
    fixed-size units so it can be read back in reverse unit order.

    Layout (little endian):

    | offset | size | field                       |
    |--------|------|-----------------------------|
    | 0      | 4    | magic `RVAS`                |
    | 4      | 1    | version                     |
    | 5      | 1    | sample format tag           |
    | 6      | 2    | channels                    |
    | 8      | 4    | sample rate                 |
    | 12     | 4    | frames per unit             |
    | 16     | 8    | total frames                |
    | 24     | ..   | interleaved samples         |

    The total is written as zero when the store is created and patched by
    [`AudioStoreWriter::finish`].
*/

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use revid_types::{AudioFrame, Pts, Rational, SampleFormat};

const MAGIC: [u8; 4] = *b"RVAS";
const VERSION: u8 = 1;
const HEADER_LEN: u64 = 24;
const TOTAL_FRAMES_OFFSET: u64 = 16;

/// Audio frames per store unit unless configured otherwise.
pub const DEFAULT_FRAMES_PER_UNIT: u32 = 1024;

/**
    Errors of the intermediate audio store.
*/
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("not an intermediate audio store")]
    BadMagic,

    #[error("unsupported store version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown sample format tag {0}")]
    UnknownFormat(u8),

    #[error("invalid store layout: {0}")]
    InvalidLayout(String),

    #[error("frame does not match the store layout: {0}")]
    LayoutMismatch(String),

    #[error("store is truncated: expected {expected} data bytes, found {actual}")]
    Truncated { expected: u64, actual: u64 },

    #[error("unit {index} is out of range ({units} units)")]
    UnitOutOfRange { index: u64, units: u64 },
}

/**
    Sample layout shared by every frame in a store.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreLayout {
    pub format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
    pub frames_per_unit: u32,
}

impl StoreLayout {
    /**
        Layout matching `frame`, cut into units of `frames_per_unit`.
    */
    pub fn for_frame(frame: &AudioFrame, frames_per_unit: u32) -> Self {
        Self {
            format: frame.format,
            channels: frame.channels,
            sample_rate: frame.sample_rate,
            frames_per_unit,
        }
    }

    /**
        Bytes of one audio frame (one sample for every channel).
    */
    pub fn bytes_per_frame(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }

    /**
        Time base of store timestamps, one tick per audio frame.
    */
    pub fn time_base(&self) -> Rational {
        Rational::new(1, self.sample_rate as i32)
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.channels == 0 {
            return Err(StoreError::InvalidLayout("zero channels".into()));
        }
        if self.sample_rate == 0 || self.sample_rate > i32::MAX as u32 {
            return Err(StoreError::InvalidLayout(format!(
                "sample rate {}",
                self.sample_rate
            )));
        }
        if self.frames_per_unit == 0 {
            return Err(StoreError::InvalidLayout("zero frames per unit".into()));
        }
        Ok(())
    }

    fn check(&self, frame: &AudioFrame) -> Result<(), StoreError> {
        if frame.format != self.format
            || frame.channels != self.channels
            || frame.sample_rate != self.sample_rate
        {
            return Err(StoreError::LayoutMismatch(format!(
                "{:?}/{}ch/{}Hz into {:?}/{}ch/{}Hz",
                frame.format,
                frame.channels,
                frame.sample_rate,
                self.format,
                self.channels,
                self.sample_rate
            )));
        }
        if frame.data.len() < frame.expected_data_len() {
            return Err(StoreError::LayoutMismatch(format!(
                "{} bytes for {} samples",
                frame.data.len(),
                frame.samples
            )));
        }
        Ok(())
    }
}

/**
    Appends decoded audio to a new store file, in forward order.
*/
pub struct AudioStoreWriter {
    path: PathBuf,
    file: BufWriter<File>,
    layout: StoreLayout,
    total_frames: u64,
}

impl AudioStoreWriter {
    /**
        Create (or truncate) the store at `path` and write its header.
    */
    pub fn create(path: impl AsRef<Path>, layout: StoreLayout) -> Result<Self, StoreError> {
        layout.validate()?;

        let path = path.as_ref().to_path_buf();
        let mut file = BufWriter::new(File::create(&path)?);
        write_header(&mut file, &layout, 0)?;

        Ok(Self {
            path,
            file,
            layout,
            total_frames: 0,
        })
    }

    pub fn layout(&self) -> StoreLayout {
        self.layout
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /**
        Audio frames written so far.
    */
    pub fn frames_written(&self) -> u64 {
        self.total_frames
    }

    /**
        Append one decoded frame. It must match the store layout.
    */
    pub fn write_frame(&mut self, frame: &AudioFrame) -> Result<(), StoreError> {
        self.layout.check(frame)?;
        self.file.write_all(&frame.data[..frame.expected_data_len()])?;
        self.total_frames += frame.samples as u64;
        Ok(())
    }

    /**
        Flush, record the total frame count and close the store.
        Returns the number of audio frames stored.
    */
    pub fn finish(self) -> Result<u64, StoreError> {
        let mut file = self.file.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(TOTAL_FRAMES_OFFSET))?;
        file.write_u64::<LittleEndian>(self.total_frames)?;
        file.sync_all()?;
        Ok(self.total_frames)
    }
}

impl std::fmt::Debug for AudioStoreWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStoreWriter")
            .field("path", &self.path)
            .field("layout", &self.layout)
            .field("total_frames", &self.total_frames)
            .finish()
    }
}

fn write_header(w: &mut impl Write, layout: &StoreLayout, total_frames: u64) -> io::Result<()> {
    w.write_all(&MAGIC)?;
    w.write_u8(VERSION)?;
    w.write_u8(layout.format.tag())?;
    w.write_u16::<LittleEndian>(layout.channels)?;
    w.write_u32::<LittleEndian>(layout.sample_rate)?;
    w.write_u32::<LittleEndian>(layout.frames_per_unit)?;
    w.write_u64::<LittleEndian>(total_frames)?;
    Ok(())
}

/**
    Random access to the units of a finished store.
*/
#[derive(Debug)]
pub struct AudioStoreReader {
    file: File,
    layout: StoreLayout,
    total_frames: u64,
}

impl AudioStoreReader {
    /**
        Open a store and validate its header against the file length.
    */
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut file = File::open(path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(StoreError::BadMagic);
        }

        let version = file.read_u8()?;
        if version != VERSION {
            return Err(StoreError::UnsupportedVersion(version));
        }

        let tag = file.read_u8()?;
        let format = SampleFormat::from_tag(tag).ok_or(StoreError::UnknownFormat(tag))?;
        let layout = StoreLayout {
            format,
            channels: file.read_u16::<LittleEndian>()?,
            sample_rate: file.read_u32::<LittleEndian>()?,
            frames_per_unit: file.read_u32::<LittleEndian>()?,
        };
        layout.validate()?;
        let total_frames = file.read_u64::<LittleEndian>()?;

        let expected = total_frames * layout.bytes_per_frame() as u64;
        let actual = file.metadata()?.len().saturating_sub(HEADER_LEN);
        if actual < expected {
            return Err(StoreError::Truncated { expected, actual });
        }

        Ok(Self {
            file,
            layout,
            total_frames,
        })
    }

    pub fn layout(&self) -> StoreLayout {
        self.layout
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /**
        Number of units; the last one may be short.
    */
    pub fn unit_count(&self) -> u64 {
        self.total_frames
            .div_ceil(self.layout.frames_per_unit as u64)
    }

    /**
        Read unit `index` in forward sample order. Its timestamp is the
        unit's first frame position in the store.
    */
    pub fn read_unit(&mut self, index: u64) -> Result<AudioFrame, StoreError> {
        let units = self.unit_count();
        if index >= units {
            return Err(StoreError::UnitOutOfRange { index, units });
        }

        let per_unit = self.layout.frames_per_unit as u64;
        let first = index * per_unit;
        let frames = per_unit.min(self.total_frames - first);
        let bytes_per_frame = self.layout.bytes_per_frame() as u64;

        self.file
            .seek(SeekFrom::Start(HEADER_LEN + first * bytes_per_frame))?;
        let mut data = vec![0u8; (frames * bytes_per_frame) as usize];
        self.file.read_exact(&mut data)?;

        Ok(AudioFrame::new(
            data,
            frames as usize,
            self.layout.sample_rate,
            self.layout.channels,
            self.layout.format,
            Pts(first as i64),
            self.layout.time_base(),
        ))
    }

    /**
        Consume the reader into an iterator over reversed audio.
    */
    pub fn into_reversed(self) -> ReverseAudioUnits {
        ReverseAudioUnits {
            remaining: self.unit_count(),
            next_pts: 0,
            skip: 0,
            emitted: 0,
            reader: self,
        }
    }
}

/**
    Yields a store's units last to first, each with its audio frames
    reversed, so the concatenated output plays the track backwards.

    Timestamps are regenerated in the store time base starting at the
    origin (zero unless set) and increase strictly from unit to unit.
*/
#[derive(Debug)]
pub struct ReverseAudioUnits {
    reader: AudioStoreReader,
    remaining: u64,
    next_pts: i64,
    /// Reversed frames still to drop before anything is emitted.
    skip: u64,
    emitted: u64,
}

impl ReverseAudioUnits {
    /**
        Place the first reversed frame at `origin` ticks of the store time
        base. A negative origin drops that many leading reversed frames
        and starts the rest at zero.
    */
    pub fn with_origin(mut self, origin: i64) -> Self {
        self.next_pts = origin.max(0);
        self.skip = origin.min(0).unsigned_abs();
        if self.skip >= self.reader.total_frames {
            self.remaining = 0;
        }
        self
    }

    pub fn layout(&self) -> StoreLayout {
        self.reader.layout
    }

    /**
        Audio frames emitted so far.
    */
    pub fn frames_emitted(&self) -> u64 {
        self.emitted
    }

    /**
        Timestamp of the next unit, if any remain.
    */
    pub fn next_pts(&self) -> Option<Pts> {
        (self.remaining > 0).then_some(Pts(self.next_pts))
    }
}

impl Iterator for ReverseAudioUnits {
    type Item = Result<AudioFrame, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining == 0 {
                return None;
            }
            self.remaining -= 1;

            let mut unit = match self.reader.read_unit(self.remaining) {
                Ok(unit) => unit,
                Err(e) => {
                    self.remaining = 0;
                    return Some(Err(e));
                }
            };

            let bytes_per_frame = self.reader.layout.bytes_per_frame();
            unit.data = reverse_frames(&unit.data, bytes_per_frame);

            if self.skip > 0 {
                let dropped = self.skip.min(unit.samples as u64) as usize;
                self.skip -= dropped as u64;
                unit.data.drain(..dropped * bytes_per_frame);
                unit.samples -= dropped;
                if unit.samples == 0 {
                    continue;
                }
            }

            unit.pts = Pts(self.next_pts);
            self.next_pts += unit.samples as i64;
            self.emitted += unit.samples as u64;

            return Some(Ok(unit));
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining as usize;
        (0, Some(remaining))
    }
}

/**
    Reverse the order of interleaved audio frames, keeping the channel
    order inside each frame.
*/
pub fn reverse_frames(data: &[u8], bytes_per_frame: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for frame in data.chunks_exact(bytes_per_frame).rev() {
        out.extend_from_slice(frame);
    }
    out
}
