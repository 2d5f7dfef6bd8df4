/*!
    Reversal plan and frame arena.

    The video track is read forward exactly once. Every frame is recorded in
    a [`ReversalPlan`] (timestamp, duration, keyframe flag) and its pixels go
    into a [`FrameArena`], either in memory or in a scratch file. The plan
    groups frames into dependency runs: a run starts at each keyframe and is
    split when it grows past the configured limit. Emission walks the runs
    last to first and each run back to front, so the arena only ever has to
    produce one run at a time.
*/

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;

use revid_types::{MediaDuration, PixelFormat, Pts, Rational, Track, VideoFrame};

use crate::config::ArenaKind;

/// Frame rate assumed when sizing a track that does not report one.
const FALLBACK_FRAME_RATE: f64 = 30.0;

/**
    What the plan remembers about one source frame.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlannedFrame {
    pub pts: Pts,
    pub duration: MediaDuration,
    pub keyframe: bool,
}

/**
    Forward-read frames and the order they are emitted in.
*/
#[derive(Clone, Debug)]
pub struct ReversalPlan {
    frames: Vec<PlannedFrame>,
    runs: Vec<Range<usize>>,
    time_base: Rational,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl ReversalPlan {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /**
        Source frames in forward (read) order.
    */
    pub fn frames(&self) -> &[PlannedFrame] {
        &self.frames
    }

    /**
        Dependency runs as ranges of source positions, in forward order.
    */
    pub fn runs(&self) -> &[Range<usize>] {
        &self.runs
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /**
        Byte size of every buffered frame.
    */
    pub fn frame_len(&self) -> usize {
        self.format.frame_len(self.width, self.height)
    }

    /**
        Source positions in emission order: `N-1, N-2, .., 0`.
    */
    pub fn emission_order(&self) -> impl Iterator<Item = usize> + '_ {
        self.runs.iter().rev().flat_map(|run| run.clone().rev())
    }

    /**
        Timestamp and duration of each output slot.

        Output slot `k` reuses the forward timing of source frame `k`,
        shifted so the first slot starts at zero. Timestamps that would not
        increase are bumped by one tick, so the result is strictly
        increasing even when the source repeats a timestamp.
    */
    pub fn output_timeline(&self) -> Vec<(Pts, MediaDuration)> {
        let Some(origin) = self.frames.first().map(|f| f.pts) else {
            return Vec::new();
        };

        let mut timeline: Vec<(Pts, MediaDuration)> = Vec::with_capacity(self.frames.len());
        for frame in &self.frames {
            let mut pts = Pts((frame.pts - origin).0);
            if let Some(&(prev, _)) = timeline.last() {
                if pts <= prev {
                    pts = Pts(prev.0 + 1);
                }
            }
            timeline.push((pts, frame.duration));
        }
        timeline
    }

    /**
        Span from the first frame's start to the last frame's end.
    */
    pub fn total_duration(&self) -> MediaDuration {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => (last.pts - first.pts) + last.duration,
            _ => MediaDuration::ZERO,
        }
    }
}

/**
    Records frames as they are read and splits them into dependency runs.
*/
#[derive(Debug)]
pub struct PlanBuilder {
    max_run_frames: usize,
    intra_only: bool,
    frames: Vec<PlannedFrame>,
    runs: Vec<Range<usize>>,
    geometry: Option<(u32, u32, PixelFormat, Rational)>,
}

impl PlanBuilder {
    /**
        Runs hold at most `max_run_frames` frames. For intra-only codecs
        every frame is its own run.
    */
    pub fn new(max_run_frames: usize, intra_only: bool) -> Self {
        Self {
            max_run_frames: max_run_frames.max(1),
            intra_only,
            frames: Vec::new(),
            runs: Vec::new(),
            geometry: None,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /**
        Record the next forward frame and return its source position.

        Every frame must share the first frame's size, pixel format and
        time base.
    */
    pub fn push(&mut self, frame: &VideoFrame) -> revid_types::Result<usize> {
        let geometry = (frame.width, frame.height, frame.format, frame.time_base);
        match self.geometry {
            None => self.geometry = Some(geometry),
            Some(expected) if expected != geometry => {
                return Err(revid_types::Error::invalid_data(format!(
                    "frame {} is {}x{} {:?} in {}, stream started as {}x{} {:?} in {}",
                    self.frames.len(),
                    frame.width,
                    frame.height,
                    frame.format,
                    frame.time_base,
                    expected.0,
                    expected.1,
                    expected.2,
                    expected.3,
                )));
            }
            Some(_) => {}
        }

        if frame.data.len() != frame.expected_data_len() {
            return Err(revid_types::Error::invalid_data(format!(
                "frame {} holds {} bytes, expected {}",
                self.frames.len(),
                frame.data.len(),
                frame.expected_data_len()
            )));
        }

        let position = self.frames.len();
        let run_full = self
            .runs
            .last()
            .is_none_or(|run| run.len() >= self.max_run_frames);

        if self.intra_only || frame.keyframe || run_full {
            self.runs.push(position..position + 1);
        } else if let Some(run) = self.runs.last_mut() {
            run.end = position + 1;
        }

        self.frames.push(PlannedFrame {
            pts: frame.pts,
            duration: frame.duration,
            keyframe: frame.keyframe,
        });

        Ok(position)
    }

    /**
        Seal the plan. Returns `None` when no frame was recorded.

        Frames without a usable duration get the gap to the next frame, or
        the previous frame's duration at the end of the stream.
    */
    pub fn finish(mut self) -> Option<ReversalPlan> {
        let (width, height, format, time_base) = self.geometry?;

        let mut previous = MediaDuration(1);
        for i in 0..self.frames.len() {
            if self.frames[i].duration.0 <= 0 {
                let gap = self
                    .frames
                    .get(i + 1)
                    .map(|next| next.pts - self.frames[i].pts)
                    .filter(|gap| gap.0 > 0);
                self.frames[i].duration = gap.unwrap_or(previous);
            }
            previous = self.frames[i].duration;
        }

        Some(ReversalPlan {
            frames: self.frames,
            runs: self.runs,
            time_base,
            width,
            height,
            format,
        })
    }
}

/**
    Estimate the decoded size of a video track in `format`.

    Uses the reported frame count when there is one, otherwise duration
    times frame rate. Returns `None` when the track reports neither a size
    nor a length.
*/
pub fn estimate_decoded_bytes(
    track: &Track,
    duration: Duration,
    format: PixelFormat,
) -> Option<u64> {
    let (width, height) = track.dimensions().filter(|&(w, h)| w > 0 && h > 0)?;

    let frames = match track.frame_count {
        Some(count) => count,
        None => {
            let seconds = track.duration.unwrap_or(duration).as_secs_f64();
            if seconds <= 0.0 {
                return None;
            }
            let rate = track
                .frame_rate()
                .map(Rational::to_f64)
                .unwrap_or(FALLBACK_FRAME_RATE);
            (seconds * rate).ceil() as u64
        }
    };

    Some(frames.saturating_mul(format.frame_len(width, height) as u64))
}

/**
    Storage for buffered frames, addressed by source position.

    With a memory limit set, a memory arena moves its frames to a scratch
    file once they would exceed the limit, and reads from a staged arena
    never hold more than the limit (at least one frame).
*/
#[derive(Debug)]
pub struct FrameArena {
    slots: Slots,
    frame_len: usize,
    staging_dir: PathBuf,
    memory_limit: Option<u64>,
}

#[derive(Debug)]
enum Slots {
    Memory(Vec<Vec<u8>>),
    Staged(StagedFrames),
}

impl FrameArena {
    /**
        Create an empty arena. Staged arenas open an anonymous scratch file
        in `staging_dir` that is removed when the arena is dropped.
    */
    pub fn new(kind: ArenaKind, staging_dir: &Path, frame_len: usize) -> io::Result<Self> {
        let slots = match kind {
            ArenaKind::Memory => Slots::Memory(Vec::new()),
            ArenaKind::Staged => Slots::Staged(StagedFrames::new(staging_dir, frame_len)?),
        };
        Ok(Self {
            slots,
            frame_len,
            staging_dir: staging_dir.to_path_buf(),
            memory_limit: None,
        })
    }

    /**
        Bound the decoded bytes held in memory. `None` leaves it unbounded.
    */
    pub fn with_memory_limit(mut self, limit: Option<u64>) -> Self {
        self.memory_limit = limit;
        self
    }

    pub fn kind(&self) -> ArenaKind {
        match self.slots {
            Slots::Memory(_) => ArenaKind::Memory,
            Slots::Staged(_) => ArenaKind::Staged,
        }
    }

    pub fn len(&self) -> usize {
        match &self.slots {
            Slots::Memory(frames) => frames.len(),
            Slots::Staged(staged) => staged.count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /**
        Frames one read may hold in memory.
    */
    pub fn window_frames(&self) -> usize {
        match self.memory_limit {
            Some(limit) => (limit / self.frame_len.max(1) as u64).max(1) as usize,
            None => usize::MAX,
        }
    }

    /**
        Append the next frame's pixels.
    */
    pub fn push(&mut self, data: Vec<u8>) -> io::Result<()> {
        let held = match &self.slots {
            Slots::Memory(frames) => {
                (frames.len() as u64 + 1).saturating_mul(self.frame_len as u64)
            }
            Slots::Staged(_) => 0,
        };
        if self.memory_limit.is_some_and(|limit| held > limit) {
            self.spill()?;
        }

        match &mut self.slots {
            Slots::Memory(frames) => {
                frames.push(data);
                Ok(())
            }
            Slots::Staged(staged) => staged.push(&data),
        }
    }

    /**
        Move every buffered frame to a scratch file and stage from now on.
    */
    fn spill(&mut self) -> io::Result<()> {
        let mut staged = StagedFrames::new(&self.staging_dir, self.frame_len)?;
        if let Slots::Memory(frames) = &self.slots {
            for frame in frames {
                staged.push(frame)?;
            }
        }
        tracing::debug!(
            target: "revid::engine",
            frames = staged.count,
            "frame buffer exceeded its memory limit, staging to disk"
        );
        self.slots = Slots::Staged(staged);
        Ok(())
    }

    /**
        Take the frames of a range of positions, in forward order.

        Memory arenas hand over their buffers, so each position can be
        taken once.
    */
    pub fn take_run(&mut self, run: Range<usize>) -> io::Result<Vec<Vec<u8>>> {
        match &mut self.slots {
            Slots::Memory(frames) => {
                let slots = frames.get_mut(run.clone()).ok_or_else(|| out_of_range(&run))?;
                Ok(slots.iter_mut().map(std::mem::take).collect())
            }
            Slots::Staged(staged) => staged.read_run(run),
        }
    }

    /**
        Iterate the plan's frames in emission order with output timing.
    */
    pub fn reverse_frames<'a>(&'a mut self, plan: &'a ReversalPlan) -> ReverseFrames<'a> {
        ReverseFrames {
            timeline: plan.output_timeline(),
            runs_left: plan.runs.len(),
            pending: 0..0,
            window: Vec::new(),
            emitted: 0,
            arena: self,
            plan,
        }
    }
}

fn out_of_range(run: &Range<usize>) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("run {run:?} is outside the arena"),
    )
}

/**
    Frames of a fixed size appended to an anonymous scratch file.
*/
#[derive(Debug)]
pub struct StagedFrames {
    file: BufWriter<File>,
    frame_len: usize,
    count: usize,
    sealed: bool,
}

impl StagedFrames {
    fn new(dir: &Path, frame_len: usize) -> io::Result<Self> {
        let file = tempfile::tempfile_in(dir)?;
        Ok(Self {
            file: BufWriter::with_capacity(frame_len.clamp(8 * 1024, 8 * 1024 * 1024), file),
            frame_len,
            count: 0,
            sealed: false,
        })
    }

    fn push(&mut self, data: &[u8]) -> io::Result<()> {
        if data.len() != self.frame_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {} bytes, arena holds {}", data.len(), self.frame_len),
            ));
        }
        if self.sealed {
            return Err(io::Error::other("staged frames are read-only once reading starts"));
        }
        self.file.write_all(data)?;
        self.count += 1;
        Ok(())
    }

    fn read_run(&mut self, run: Range<usize>) -> io::Result<Vec<Vec<u8>>> {
        if run.end > self.count || run.start > run.end {
            return Err(out_of_range(&run));
        }

        self.sealed = true;
        self.file.flush()?;
        let file = self.file.get_mut();
        file.seek(SeekFrom::Start((run.start * self.frame_len) as u64))?;

        let mut frames = Vec::with_capacity(run.len());
        for _ in run {
            let mut frame = vec![0u8; self.frame_len];
            file.read_exact(&mut frame)?;
            frames.push(frame);
        }
        Ok(frames)
    }
}

/**
    Emits buffered frames last to first, walking the runs back to front and
    loading at most [`FrameArena::window_frames`] frames at a time.

    Frame `k` of the output carries the timing of output slot `k` from
    [`ReversalPlan::output_timeline`]. After an error the iterator is
    exhausted.
*/
pub struct ReverseFrames<'a> {
    arena: &'a mut FrameArena,
    plan: &'a ReversalPlan,
    timeline: Vec<(Pts, MediaDuration)>,
    runs_left: usize,
    /// Positions of the current run not loaded yet.
    pending: Range<usize>,
    window: Vec<Vec<u8>>,
    emitted: usize,
}

impl ReverseFrames<'_> {
    /**
        Output timestamp of the next frame, if any remain.
    */
    pub fn next_pts(&self) -> Option<Pts> {
        if self.window.is_empty() && self.pending.is_empty() && self.runs_left == 0 {
            return None;
        }
        self.timeline.get(self.emitted).map(|&(pts, _)| pts)
    }

    /**
        Frames emitted so far.
    */
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /**
        Decoded bytes currently loaded and waiting to be emitted.
    */
    pub fn buffered_bytes(&self) -> usize {
        self.window.iter().map(Vec::len).sum()
    }

    fn refill(&mut self) -> io::Result<bool> {
        while self.pending.is_empty() {
            if self.runs_left == 0 {
                return Ok(false);
            }
            self.runs_left -= 1;
            self.pending = self.plan.runs[self.runs_left].clone();
        }

        let window = self.arena.window_frames().min(self.pending.len());
        let tail = self.pending.end - window..self.pending.end;
        self.pending.end = tail.start;
        self.window = self.arena.take_run(tail)?;
        Ok(true)
    }
}

impl Iterator for ReverseFrames<'_> {
    type Item = io::Result<VideoFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.window.is_empty() {
            match self.refill() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => {
                    self.runs_left = 0;
                    self.pending = 0..0;
                    return Some(Err(e));
                }
            }
        }

        let data = self.window.pop()?;
        let (pts, duration) = self.timeline[self.emitted];
        let (width, height) = self.plan.dimensions();
        let frame = VideoFrame::new(
            data,
            width,
            height,
            self.plan.format,
            pts,
            duration,
            self.emitted == 0,
            self.plan.time_base,
        );
        self.emitted += 1;

        Some(Ok(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TB: Rational = Rational::new(1, 1000);

    /// 2x2 gray frame filled with `index`.
    fn frame(index: u8, pts: i64, keyframe: bool) -> VideoFrame {
        VideoFrame::new(
            vec![index; 4],
            2,
            2,
            PixelFormat::Gray8,
            Pts(pts),
            MediaDuration(40),
            keyframe,
            TB,
        )
    }

    fn plan_of(keyframes: &[bool], max_run: usize, intra_only: bool) -> ReversalPlan {
        let mut builder = PlanBuilder::new(max_run, intra_only);
        for (i, &key) in keyframes.iter().enumerate() {
            builder.push(&frame(i as u8, i as i64 * 40, key)).unwrap();
        }
        builder.finish().unwrap()
    }

    #[test]
    fn runs_start_at_keyframes() {
        let plan = plan_of(&[true, false, false, true, false, true], 300, false);
        assert_eq!(plan.runs(), &[0..3, 3..5, 5..6]);
    }

    #[test]
    fn long_runs_are_split() {
        let plan = plan_of(&[true, false, false, false, false, false, false], 3, false);
        assert_eq!(plan.runs(), &[0..3, 3..6, 6..7]);
    }

    #[test]
    fn open_gop_start_still_gets_a_run() {
        let plan = plan_of(&[false, false, true], 300, false);
        assert_eq!(plan.runs(), &[0..2, 2..3]);
    }

    #[test]
    fn intra_only_runs_are_single_frames() {
        let plan = plan_of(&[true, false, false], 300, true);
        assert_eq!(plan.runs(), &[0..1, 1..2, 2..3]);
    }

    #[test]
    fn emission_order_is_reverse() {
        let plan = plan_of(&[true, false, true, false, false], 2, false);
        let order: Vec<usize> = plan.emission_order().collect();
        assert_eq!(order, vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn timeline_starts_at_zero_and_increases() {
        let mut builder = PlanBuilder::new(300, false);
        for (i, pts) in [1000, 1040, 1040, 1120].into_iter().enumerate() {
            builder.push(&frame(i as u8, pts, i == 0)).unwrap();
        }
        let plan = builder.finish().unwrap();

        let pts: Vec<i64> = plan.output_timeline().iter().map(|(p, _)| p.0).collect();
        assert_eq!(pts, vec![0, 40, 41, 120]);
        assert_eq!(plan.total_duration(), MediaDuration(160));
    }

    #[test]
    fn missing_durations_are_filled() {
        let mut builder = PlanBuilder::new(300, false);
        for (i, pts) in [0, 33, 66].into_iter().enumerate() {
            let mut f = frame(i as u8, pts, i == 0);
            f.duration = MediaDuration::ZERO;
            builder.push(&f).unwrap();
        }
        let plan = builder.finish().unwrap();
        let durations: Vec<i64> = plan.frames().iter().map(|f| f.duration.0).collect();
        assert_eq!(durations, vec![33, 33, 33]);
        assert_eq!(plan.total_duration(), MediaDuration(99));
    }

    #[test]
    fn geometry_change_is_rejected() {
        let mut builder = PlanBuilder::new(300, false);
        builder.push(&frame(0, 0, true)).unwrap();

        let mut wide = frame(1, 40, false);
        wide.width = 4;
        wide.data = vec![1; 8];
        assert!(builder.push(&wide).is_err());
    }

    #[test]
    fn empty_builder_has_no_plan() {
        assert!(PlanBuilder::new(10, false).finish().is_none());
    }

    #[test]
    fn estimate_uses_frame_count_or_duration() {
        use revid_types::{CodecId, TrackFormat, TrackKind};

        let mut track = Track {
            index: 0,
            kind: TrackKind::Video,
            codec: CodecId::H264,
            time_base: TB,
            format: TrackFormat::Video {
                width: 4,
                height: 4,
                frame_rate: Rational::new(10, 1),
            },
            duration: Some(Duration::from_secs(2)),
            frame_count: None,
        };
        // 4x4 yuv420p = 16 + 4 + 4 bytes
        assert_eq!(
            estimate_decoded_bytes(&track, Duration::ZERO, PixelFormat::Yuv420p),
            Some(20 * 24)
        );

        track.frame_count = Some(7);
        assert_eq!(
            estimate_decoded_bytes(&track, Duration::ZERO, PixelFormat::Yuv420p),
            Some(7 * 24)
        );
    }

    #[test]
    fn estimate_is_unknown_without_length_or_size() {
        use revid_types::{CodecId, TrackFormat, TrackKind};

        let mut track = Track {
            index: 0,
            kind: TrackKind::Video,
            codec: CodecId::H264,
            time_base: TB,
            format: TrackFormat::Video {
                width: 4,
                height: 4,
                frame_rate: Rational::new(10, 1),
            },
            duration: None,
            frame_count: None,
        };
        assert_eq!(
            estimate_decoded_bytes(&track, Duration::ZERO, PixelFormat::Yuv420p),
            None
        );
        assert_eq!(
            estimate_decoded_bytes(&track, Duration::from_secs(1), PixelFormat::Yuv420p),
            Some(10 * 24)
        );

        track.frame_count = Some(7);
        track.format = TrackFormat::Video {
            width: 0,
            height: 0,
            frame_rate: Rational::new(10, 1),
        };
        assert_eq!(
            estimate_decoded_bytes(&track, Duration::ZERO, PixelFormat::Yuv420p),
            None
        );
    }

    fn reversed_payloads(kind: ArenaKind) -> (Vec<u8>, Vec<i64>) {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = PlanBuilder::new(2, false);
        let mut arena = FrameArena::new(kind, dir.path(), 4).unwrap();

        for i in 0..5u8 {
            let f = frame(i, i as i64 * 40, i == 0 || i == 3);
            builder.push(&f).unwrap();
            arena.push(f.data).unwrap();
        }
        let plan = builder.finish().unwrap();
        assert_eq!(arena.kind(), kind);
        assert_eq!(arena.len(), 5);

        let frames: Vec<VideoFrame> = arena
            .reverse_frames(&plan)
            .collect::<io::Result<_>>()
            .unwrap();
        (
            frames.iter().map(|f| f.data[0]).collect(),
            frames.iter().map(|f| f.pts.0).collect(),
        )
    }

    #[test]
    fn memory_arena_emits_reverse() {
        let (payloads, pts) = reversed_payloads(ArenaKind::Memory);
        assert_eq!(payloads, vec![4, 3, 2, 1, 0]);
        assert_eq!(pts, vec![0, 40, 80, 120, 160]);
    }

    #[test]
    fn staged_arena_emits_reverse() {
        let (payloads, pts) = reversed_payloads(ArenaKind::Staged);
        assert_eq!(payloads, vec![4, 3, 2, 1, 0]);
        assert_eq!(pts, vec![0, 40, 80, 120, 160]);
    }

    #[test]
    fn staged_arena_rejects_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = FrameArena::new(ArenaKind::Staged, dir.path(), 4).unwrap();
        assert!(arena.push(vec![0; 3]).is_err());
        assert!(arena.take_run(0..1).is_err());
    }

    #[test]
    fn memory_arena_spills_past_its_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = PlanBuilder::new(8, false);
        let mut arena = FrameArena::new(ArenaKind::Memory, dir.path(), 4)
            .unwrap()
            .with_memory_limit(Some(12));

        for i in 0..5u8 {
            let f = frame(i, i as i64 * 40, i == 0);
            builder.push(&f).unwrap();
            arena.push(f.data).unwrap();
            let expected = if i < 3 { ArenaKind::Memory } else { ArenaKind::Staged };
            assert_eq!(arena.kind(), expected);
        }
        assert_eq!(arena.len(), 5);

        let plan = builder.finish().unwrap();
        let payloads: Vec<u8> = arena
            .reverse_frames(&plan)
            .map(|f| f.unwrap().data[0])
            .collect();
        assert_eq!(payloads, vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn unbounded_memory_arena_never_spills() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = FrameArena::new(ArenaKind::Memory, dir.path(), 4).unwrap();
        for i in 0..64u8 {
            arena.push(vec![i; 4]).unwrap();
        }
        assert_eq!(arena.kind(), ArenaKind::Memory);
        assert_eq!(arena.window_frames(), usize::MAX);
    }

    #[test]
    fn staged_reads_stay_within_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = PlanBuilder::new(300, false);
        let mut arena = FrameArena::new(ArenaKind::Staged, dir.path(), 4)
            .unwrap()
            .with_memory_limit(Some(8));
        assert_eq!(arena.window_frames(), 2);

        for i in 0..300usize {
            let f = frame((i % 251) as u8, i as i64 * 40, i == 0);
            builder.push(&f).unwrap();
            arena.push(f.data).unwrap();
        }
        let plan = builder.finish().unwrap();
        assert_eq!(plan.runs.len(), 1);

        let mut frames = arena.reverse_frames(&plan);
        let mut payloads = Vec::new();
        while let Some(f) = frames.next() {
            assert!(frames.buffered_bytes() <= 8);
            payloads.push(f.unwrap().data[0]);
        }
        assert_eq!(frames.emitted(), 300);
        assert_eq!(
            payloads,
            (0..300usize).rev().map(|i| (i % 251) as u8).collect::<Vec<_>>()
        );
    }

    #[test]
    fn tiny_limit_still_reads_one_frame() {
        let dir = tempfile::tempdir().unwrap();
        let arena = FrameArena::new(ArenaKind::Staged, dir.path(), 4)
            .unwrap()
            .with_memory_limit(Some(1));
        assert_eq!(arena.window_frames(), 1);
    }
}
