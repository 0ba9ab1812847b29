use super::super::args::ArgList;
use super::super::dispatch::{CommandHandler, DispatchContext, DispatchError, DispatchOutcome};
use super::InputError;
use super::topology::TopologyList;
use crate::core::io::registry::{Detected, TrajFormat, detect_format};
use crate::core::io::traits::TrajectoryCodec;
use crate::core::models::frame::Frame;
use crate::core::models::topology::Topology;
use crate::core::parallel::World;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Positions `[r·chunk, (r+1)·chunk)` of `total` for rank `r`, with the remainder going to
/// the last rank.
pub fn rank_window(total: usize, rank: usize, size: usize) -> Range<usize> {
    let chunk = total / size;
    let start = rank * chunk;
    let end = if rank + 1 == size { total } else { start + chunk };
    start..end
}

/// Number of frames read from `start` (1-based) to `stop` inclusive every `offset` frames.
fn frames_in_range(start: usize, stop: usize, offset: usize) -> usize {
    if start > stop {
        0
    } else {
        (stop - start) / offset + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Detection or frame counting failed during setup.
    NotSetUp,
    OpenFailed,
    /// The trajectory is fine but this rank's share of it is empty.
    NoFramesForRank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    Ready,
    Skip(SkipReason),
}

/// One input trajectory bound to one topology.
pub struct TrajectoryIn {
    path: PathBuf,
    pindex: usize,
    start: usize,
    stop: Option<usize>,
    offset: usize,
    format: Option<TrajFormat>,
    codec: Option<Box<dyn TrajectoryCodec>>,
    total_frames: usize,
    total_read_frames: usize,
    global_offset: usize,
    window: Range<usize>,
    cursor: usize,
    frame: Frame,
    is_open: bool,
}

impl TrajectoryIn {
    /// `start` and `stop` are 1-based and inclusive; `stop` of `None` means the last frame.
    pub fn new(
        path: impl Into<PathBuf>,
        pindex: usize,
        start: usize,
        stop: Option<usize>,
        offset: usize,
    ) -> Self {
        Self {
            path: path.into(),
            pindex,
            start: start.max(1),
            stop,
            offset: offset.max(1),
            format: None,
            codec: None,
            total_frames: 0,
            total_read_frames: 0,
            global_offset: 0,
            window: 0..0,
            cursor: 0,
            frame: Frame::default(),
            is_open: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pindex(&self) -> usize {
        self.pindex
    }

    pub fn format(&self) -> Option<TrajFormat> {
        self.format
    }

    pub fn total_read_frames(&self) -> usize {
        self.total_read_frames
    }

    /// Frames read from all earlier trajectories in the list.
    pub fn global_offset(&self) -> usize {
        self.global_offset
    }

    /// This rank's positions within the frames to be read.
    pub fn window(&self) -> Range<usize> {
        self.window.clone()
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Detects the format and counts frames, fixing `total_read_frames`.
    pub fn setup(&mut self, topology: &Topology) -> Result<usize, InputError> {
        self.total_read_frames = 0;
        let Detected { format, mut codec } = detect_format(&self.path)?;
        let frames = codec.setup_read(&self.path, topology)?;

        let stop = match self.stop {
            Some(stop) if stop > frames => {
                warn!(
                    path = %self.path.display(),
                    "Stop frame {stop} is beyond the last frame ({frames}); reading to the end."
                );
                frames
            }
            Some(stop) => stop,
            None => frames,
        };
        self.total_read_frames = frames_in_range(self.start, stop, self.offset);
        if self.total_read_frames == 0 {
            warn!(path = %self.path.display(), "Start frame {} is after stop frame {stop}; no frames will be read.", self.start);
        }
        self.total_frames = frames;
        self.format = Some(format);
        self.codec = Some(codec);
        Ok(self.total_read_frames)
    }

    /// Opens the trajectory and positions this rank at the start of its window.
    ///
    /// On success `action_set` becomes the global number of the first frame this rank reads.
    pub fn begin(&mut self, world: &World, action_set: &mut usize) -> BeginOutcome {
        let Some(codec) = self.codec.as_mut() else {
            return BeginOutcome::Skip(SkipReason::NotSetUp);
        };
        self.window = rank_window(self.total_read_frames, world.rank(), world.size());
        if self.window.is_empty() {
            return BeginOutcome::Skip(SkipReason::NoFramesForRank);
        }
        if let Err(e) = codec.open_read() {
            warn!(path = %self.path.display(), error = %e, "Could not open trajectory.");
            return BeginOutcome::Skip(SkipReason::OpenFailed);
        }
        self.is_open = true;
        self.cursor = self.window.start;
        *action_set = self.global_offset + self.window.start;
        debug!(
            path = %self.path.display(),
            rank = world.rank(),
            start = self.window.start,
            end = self.window.end,
            "Trajectory opened."
        );
        BeginOutcome::Ready
    }

    /// Reads the next frame of this rank's window, counting it in `global_set`.
    ///
    /// A read error ends the trajectory early with a warning.
    pub fn next_frame(&mut self, global_set: &mut usize) -> Option<&mut Frame> {
        if !self.is_open || self.cursor >= self.window.end {
            return None;
        }
        let set = (self.start - 1) + self.cursor * self.offset;
        let codec = self.codec.as_mut()?;
        match codec.read_frame(set, &mut self.frame) {
            Ok(()) => {
                self.cursor += 1;
                *global_set += 1;
                Some(&mut self.frame)
            }
            Err(e) => {
                warn!(path = %self.path.display(), frame = set + 1, error = %e, "Could not read frame; ending trajectory.");
                self.cursor = self.window.end;
                None
            }
        }
    }

    pub fn end(&mut self) {
        if let Some(codec) = self.codec.as_mut() {
            if let Err(e) = codec.close() {
                warn!(path = %self.path.display(), error = %e, "Error closing trajectory.");
            }
        }
        self.is_open = false;
    }

    pub fn info(&self) -> String {
        let description = self
            .codec
            .as_ref()
            .map_or_else(|| format!("'{}'", self.path.display()), |c| c.info());
        let stop = match self.stop {
            Some(stop) => stop.min(self.total_frames),
            None => self.total_frames,
        };
        format!(
            "{description}: {} of {} frames (start {}, stop {stop}, offset {})",
            self.total_read_frames, self.total_frames, self.start, self.offset
        )
    }
}

#[derive(Default)]
pub struct TrajinList {
    trajectories: Vec<TrajectoryIn>,
}

impl TrajinList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trajectory: TrajectoryIn) {
        self.trajectories.push(trajectory);
    }

    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrajectoryIn> {
        self.trajectories.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrajectoryIn> {
        self.trajectories.iter_mut()
    }

    /// Sets up every trajectory and returns the total number of frames to be read.
    ///
    /// Trajectories that cannot be set up contribute no frames and are skipped at run time.
    pub fn setup_frames(&mut self, topologies: &TopologyList, world: &World) -> usize {
        let mut total = 0;
        for trajectory in &mut self.trajectories {
            trajectory.global_offset = total;
            let Some(topology) = topologies.get(trajectory.pindex) else {
                warn!(path = %trajectory.path.display(), "Topology {} is not loaded; skipping.", trajectory.pindex);
                continue;
            };
            match trajectory.setup(topology) {
                Ok(frames) => total += frames,
                Err(e) => {
                    warn!(path = %trajectory.path.display(), error = %e, "Could not set up trajectory; skipping.");
                    continue;
                }
            }
            if world.is_master() {
                info!("  {} [{}]", trajectory.info(), topology.name());
            }
        }
        info!(trajectories = self.trajectories.len(), total, "Input frames.");
        total
    }
}

impl CommandHandler for TrajinList {
    fn try_dispatch(
        &mut self,
        args: &mut ArgList,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<DispatchOutcome, DispatchError> {
        if !args.command_is("trajin") {
            return Ok(DispatchOutcome::Unrecognized);
        }
        let pindex = ctx.topologies.resolve(args)?;
        let path = args
            .next_string()
            .ok_or(DispatchError::MissingFileName { command: "trajin" })?;
        let start = args.next_integer(1);
        let stop = if args.has_key("last") {
            -1
        } else {
            args.next_integer(-1)
        };
        let offset = args.next_integer(1);

        let positive = |key: &'static str, value: i64| {
            usize::try_from(value)
                .ok()
                .filter(|&v| v > 0)
                .ok_or(DispatchError::InvalidValue {
                    key,
                    reason: format!("{value} is not a positive frame number"),
                })
        };
        let start = positive("start", start)?;
        let stop = match stop {
            -1 => None,
            stop => Some(positive("stop", stop)?),
        };
        let offset = positive("offset", offset)?;

        debug!(path = %path, pindex, start, ?stop, offset, "Added input trajectory.");
        self.trajectories
            .push(TrajectoryIn::new(path, pindex, start, stop, offset));
        Ok(DispatchOutcome::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::Settings;
    use crate::test_utils::{line_topology, write_crd, write_file};
    use tempfile::tempdir;

    mod windows {
        use super::*;

        #[test]
        fn windows_partition_the_frames_in_rank_order() {
            for total in [0, 1, 7, 10, 64] {
                for size in 1..=5 {
                    let windows: Vec<_> = (0..size).map(|r| rank_window(total, r, size)).collect();
                    assert_eq!(windows[0].start, 0);
                    for pair in windows.windows(2) {
                        assert_eq!(pair[0].end, pair[1].start);
                    }
                    assert_eq!(windows.iter().map(|w| w.len()).sum::<usize>(), total);
                }
            }
        }

        #[test]
        fn last_rank_takes_the_remainder() {
            assert_eq!(rank_window(10, 0, 3), 0..3);
            assert_eq!(rank_window(10, 1, 3), 3..6);
            assert_eq!(rank_window(10, 2, 3), 6..10);
            assert_eq!(rank_window(2, 0, 4), 0..0);
            assert_eq!(rank_window(2, 3, 4), 0..2);
        }

        #[test]
        fn frame_range_counts_with_offset() {
            assert_eq!(frames_in_range(1, 10, 1), 10);
            assert_eq!(frames_in_range(1, 10, 3), 4);
            assert_eq!(frames_in_range(5, 5, 2), 1);
            assert_eq!(frames_in_range(6, 5, 1), 0);
        }
    }

    mod reading {
        use super::*;

        fn frame_ys(trajectory: &mut TrajectoryIn, world: &World) -> (Vec<f64>, usize) {
            let mut action_set = 0;
            assert_eq!(trajectory.begin(world, &mut action_set), BeginOutcome::Ready);
            let mut global_set = 0;
            let mut ys = Vec::new();
            while let Some(frame) = trajectory.next_frame(&mut global_set) {
                ys.push(frame.coords[0].y);
            }
            trajectory.end();
            assert_eq!(global_set, ys.len());
            (ys, action_set)
        }

        #[test]
        fn start_stop_offset_select_frames() {
            let dir = tempdir().unwrap();
            let topology = line_topology(2);
            let path = write_crd(dir.path(), "md.crd", &topology, 10);
            let mut trajectory = TrajectoryIn::new(&path, 0, 2, Some(8), 3);
            assert_eq!(trajectory.setup(&topology).unwrap(), 3);
            assert_eq!(trajectory.format(), Some(TrajFormat::AmberTraj));
            let (ys, _) = frame_ys(&mut trajectory, &World::serial());
            assert_eq!(ys, vec![1.0, 4.0, 7.0]);
            assert!(!trajectory.is_open());
        }

        #[test]
        fn stop_beyond_end_is_clamped() {
            let dir = tempdir().unwrap();
            let topology = line_topology(2);
            let path = write_crd(dir.path(), "md.crd", &topology, 4);
            let mut trajectory = TrajectoryIn::new(&path, 0, 1, Some(100), 1);
            assert_eq!(trajectory.setup(&topology).unwrap(), 4);
        }

        #[test]
        fn ranks_read_their_own_window() {
            let dir = tempdir().unwrap();
            let topology = line_topology(2);
            let path = write_crd(dir.path(), "md.crd", &topology, 5);
            let results = World::spawn(2, |world| {
                let mut trajectory = TrajectoryIn::new(&path, 0, 1, None, 1);
                trajectory.global_offset = 20;
                trajectory.setup(&topology).unwrap();
                frame_ys(&mut trajectory, &world)
            })
            .unwrap();
            assert_eq!(results[0], (vec![0.0, 1.0], 20));
            assert_eq!(results[1], (vec![2.0, 3.0, 4.0], 22));
        }

        #[test]
        fn unset_trajectory_is_skipped() {
            let mut trajectory = TrajectoryIn::new("/nonexistent/md.crd", 0, 1, None, 1);
            assert!(trajectory.setup(&line_topology(2)).is_err());
            let mut action_set = 7;
            assert_eq!(
                trajectory.begin(&World::serial(), &mut action_set),
                BeginOutcome::Skip(SkipReason::NotSetUp)
            );
            assert_eq!(action_set, 7);
        }

        #[test]
        fn empty_share_is_reported_per_rank() {
            let dir = tempdir().unwrap();
            let topology = line_topology(2);
            let path = write_crd(dir.path(), "md.crd", &topology, 1);
            let outcomes = World::spawn(2, |world| {
                let mut trajectory = TrajectoryIn::new(&path, 0, 1, None, 1);
                trajectory.setup(&topology).unwrap();
                let mut action_set = 0;
                trajectory.begin(&world, &mut action_set)
            })
            .unwrap();
            assert_eq!(outcomes[0], BeginOutcome::Skip(SkipReason::NoFramesForRank));
            assert_eq!(outcomes[1], BeginOutcome::Ready);
        }
    }

    mod list {
        use super::*;

        #[test]
        fn global_offsets_accumulate_and_failures_add_nothing() {
            let dir = tempdir().unwrap();
            let mut topologies = TopologyList::new();
            topologies.push(line_topology(2));
            let topology = topologies.get(0).unwrap().clone();
            let a = write_crd(dir.path(), "a.crd", &topology, 4);
            let junk = write_file(dir.path(), "junk.txt", "nothing to see\n");
            let b = write_crd(dir.path(), "b.crd", &topology, 3);

            let mut list = TrajinList::new();
            list.push(TrajectoryIn::new(a, 0, 1, None, 1));
            list.push(TrajectoryIn::new(junk, 0, 1, None, 1));
            list.push(TrajectoryIn::new(b, 0, 1, None, 1));
            assert_eq!(list.setup_frames(&topologies, &World::serial()), 7);

            let offsets: Vec<usize> = list.iter().map(TrajectoryIn::global_offset).collect();
            assert_eq!(offsets, vec![0, 4, 4]);
        }

        fn add(list: &mut TrajinList, topologies: &mut TopologyList, line: &str) -> Result<DispatchOutcome, DispatchError> {
            let mut settings = Settings::default();
            let mut ctx = DispatchContext {
                topologies,
                settings: &mut settings,
                rank: 0,
                size: 1,
            };
            list.try_dispatch(&mut ArgList::new(line), &mut ctx)
        }

        #[test]
        fn trajin_arguments_are_parsed() {
            let mut topologies = TopologyList::new();
            topologies.push(line_topology(2));
            topologies.push(line_topology(3));
            let mut list = TrajinList::new();
            let outcome = add(&mut list, &mut topologies, "trajin md.crd 5 last 2 parmindex 1").unwrap();
            assert_eq!(outcome, DispatchOutcome::Accepted);
            let added = list.iter().next().unwrap();
            assert_eq!(added.path(), Path::new("md.crd"));
            assert_eq!(added.pindex(), 1);
            assert_eq!((added.start, added.stop, added.offset), (5, None, 2));
        }

        #[test]
        fn other_commands_leave_the_list_alone() {
            let mut topologies = TopologyList::new();
            let mut list = TrajinList::new();
            assert_eq!(
                add(&mut list, &mut topologies, "trajout md.crd").unwrap(),
                DispatchOutcome::Unrecognized
            );
            assert!(list.is_empty());
        }

        #[test]
        fn invalid_frame_numbers_are_rejected() {
            let mut topologies = TopologyList::new();
            topologies.push(line_topology(2));
            let mut list = TrajinList::new();
            assert!(matches!(
                add(&mut list, &mut topologies, "trajin md.crd 0"),
                Err(DispatchError::InvalidValue { key: "start", .. })
            ));
            assert!(list.is_empty());
        }
    }
}
