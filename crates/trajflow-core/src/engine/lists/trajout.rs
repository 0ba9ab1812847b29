use super::super::args::ArgList;
use super::super::dispatch::{CommandHandler, DispatchContext, DispatchError, DispatchOutcome};
use crate::core::io::registry::{TrajFormat, format_from_extension, format_from_keyword};
use crate::core::io::traits::{CodecError, TrajectoryCodec};
use crate::core::models::frame::Frame;
use crate::core::models::topology::Topology;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DEFAULT_FORMAT: TrajFormat = TrajFormat::AmberTraj;

/// An output trajectory, opened on the first frame written to it.
///
/// The output is bound to one topology when it is registered (the first one unless
/// `parm`/`parmindex` says otherwise); frames from any other topology are ignored.
pub struct TrajectoryOut {
    path: PathBuf,
    format: TrajFormat,
    pindex: usize,
    nobox: bool,
    codec: Option<Box<dyn TrajectoryCodec>>,
    failed: bool,
    frames_written: usize,
}

impl TrajectoryOut {
    pub fn new(path: impl Into<PathBuf>, format: TrajFormat, pindex: usize, nobox: bool) -> Self {
        Self {
            path: path.into(),
            format,
            pindex,
            nobox,
            codec: None,
            failed: false,
            frames_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> TrajFormat {
        self.format
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    pub fn pindex(&self) -> usize {
        self.pindex
    }

    fn write(&mut self, set: usize, frame: &Frame, topology: &Topology) -> Result<(), CodecError> {
        if self.pindex != topology.pindex() {
            return Ok(());
        }
        if self.codec.is_none() {
            let mut codec = self
                .format
                .new_codec()
                .ok_or(CodecError::Unsupported(self.format.name()))?;
            codec.setup_write(&self.path, topology)?;
            debug!(path = %self.path.display(), format = %self.format, "Opened output trajectory.");
            self.codec = Some(codec);
        }
        let codec = self.codec.as_mut().ok_or(CodecError::NotOpen)?;
        if self.nobox && frame.periodic_box.is_some() {
            let stripped = Frame {
                periodic_box: None,
                ..frame.clone()
            };
            codec.write_frame(set, &stripped)?;
        } else {
            codec.write_frame(set, frame)?;
        }
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), CodecError> {
        match self.codec.take() {
            Some(mut codec) => codec.close(),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct TrajoutList {
    outputs: Vec<TrajectoryOut>,
}

impl TrajoutList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrajectoryOut> {
        self.outputs.iter()
    }

    /// Writes `frame` as output frame `set` to every output bound to `topology`.
    ///
    /// An output that fails is reported once and receives no further frames.
    pub fn write(&mut self, set: usize, frame: &Frame, topology: &Topology) {
        for output in self.outputs.iter_mut().filter(|o| !o.failed) {
            if let Err(e) = output.write(set, frame, topology) {
                warn!(path = %output.path.display(), error = %e, "Could not write output trajectory; no further frames will be written to it.");
                output.failed = true;
            }
        }
    }

    pub fn close(&mut self) {
        for output in &mut self.outputs {
            if let Err(e) = output.close() {
                warn!(path = %output.path.display(), error = %e, "Error closing output trajectory.");
            }
            debug!(path = %output.path.display(), frames = output.frames_written, "Closed output trajectory.");
        }
    }

    pub fn info(&self) {
        info!("Output trajectories:");
        if self.outputs.is_empty() {
            info!("  none");
        }
        for output in &self.outputs {
            info!(
                "  '{}' ({}){}",
                output.path.display(),
                output.format,
                if output.nobox { ", box removed" } else { "" }
            );
        }
    }
}

impl CommandHandler for TrajoutList {
    fn try_dispatch(
        &mut self,
        args: &mut ArgList,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<DispatchOutcome, DispatchError> {
        if !args.command_is("trajout") {
            return Ok(DispatchOutcome::Unrecognized);
        }
        let pindex = ctx.topologies.resolve(args)?;
        let nobox = args.has_key("nobox");
        let path = args
            .next_string()
            .ok_or(DispatchError::MissingFileName { command: "trajout" })?;
        let keyword = args
            .unmarked()
            .into_iter()
            .find(|t| format_from_keyword(t).is_some())
            .map(str::to_string);
        let format = match keyword {
            Some(keyword) => {
                args.has_key(&keyword);
                format_from_keyword(&keyword).unwrap_or(DEFAULT_FORMAT)
            }
            None => format_from_extension(Path::new(&path)).unwrap_or(DEFAULT_FORMAT),
        };
        if format.descriptor().and_then(|d| d.factory).is_none() {
            return Err(DispatchError::Unwritable(format.name()));
        }

        let path = if ctx.size > 1 {
            PathBuf::from(format!("{path}.{}", ctx.rank))
        } else {
            PathBuf::from(path)
        };
        debug!(path = %path.display(), %format, pindex, nobox, "Added output trajectory.");
        self.outputs.push(TrajectoryOut::new(path, format, pindex, nobox));
        Ok(DispatchOutcome::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::frame::PeriodicBox;
    use crate::engine::lists::topology::TopologyList;
    use crate::engine::state::Settings;
    use crate::test_utils::line_topology;
    use std::fs;
    use tempfile::tempdir;

    fn add(list: &mut TrajoutList, line: &str, rank: usize, size: usize) -> Result<DispatchOutcome, DispatchError> {
        let mut topologies = TopologyList::new();
        topologies.push(line_topology(2));
        topologies.push(line_topology(2));
        let mut settings = Settings::default();
        let mut ctx = DispatchContext {
            topologies: &mut topologies,
            settings: &mut settings,
            rank,
            size,
        };
        list.try_dispatch(&mut ArgList::new(line), &mut ctx)
    }

    mod registration {
        use super::*;

        #[test]
        fn keyword_overrides_extension() {
            let mut list = TrajoutList::new();
            add(&mut list, "trajout out.crd pdb", 0, 1).unwrap();
            add(&mut list, "trajout out.mol2", 0, 1).unwrap();
            add(&mut list, "trajout out.unknown", 0, 1).unwrap();
            let formats: Vec<_> = list.iter().map(TrajectoryOut::format).collect();
            assert_eq!(formats, vec![TrajFormat::Pdb, TrajFormat::Mol2, TrajFormat::AmberTraj]);
        }

        #[test]
        fn ranks_write_their_own_files() {
            let mut list = TrajoutList::new();
            add(&mut list, "trajout out.pdb", 1, 2).unwrap();
            assert_eq!(list.iter().next().unwrap().path(), Path::new("out.pdb.1"));
        }

        #[test]
        fn formats_without_codec_are_refused() {
            let mut list = TrajoutList::new();
            let err = add(&mut list, "trajout out.nc netcdf", 0, 1).unwrap_err();
            assert!(matches!(err, DispatchError::Unwritable(_)));
            assert!(list.is_empty());
        }

        #[test]
        fn explicit_topology_is_recorded() {
            let mut list = TrajoutList::new();
            add(&mut list, "trajout out.pdb parmindex 1 nobox", 0, 1).unwrap();
            let output = list.iter().next().unwrap();
            assert_eq!(output.pindex(), 1);
            assert!(output.nobox);
        }

        #[test]
        fn unnamed_topology_defaults_to_the_first() {
            let mut list = TrajoutList::new();
            add(&mut list, "trajout out.pdb", 1, 2).unwrap();
            assert_eq!(list.iter().next().unwrap().pindex(), 0);

            let mut settings = Settings::default();
            let mut ctx = DispatchContext {
                topologies: &mut TopologyList::new(),
                settings: &mut settings,
                rank: 0,
                size: 1,
            };
            let err = list
                .try_dispatch(&mut ArgList::new("trajout other.pdb"), &mut ctx)
                .unwrap_err();
            assert!(matches!(err, DispatchError::NoTopology));
            assert_eq!(list.len(), 1);
        }
    }

    mod writing {
        use super::*;

        #[test]
        fn output_opens_lazily_and_skips_other_topologies() {
            let dir = tempdir().unwrap();
            let path = dir.path().join("out.pdb");
            let mut list = TrajoutList::new();
            list.outputs.push(TrajectoryOut::new(&path, TrajFormat::Pdb, 0, false));
            assert!(!path.exists());

            let mut topologies = TopologyList::new();
            topologies.push(line_topology(2));
            topologies.push(line_topology(3));
            list.write(0, &Frame::new(2), topologies.get(0).unwrap());
            list.write(1, &Frame::new(3), topologies.get(1).unwrap());
            list.write(2, &Frame::new(2), topologies.get(0).unwrap());
            list.close();

            assert_eq!(list.iter().next().unwrap().frames_written(), 2);
            let text = fs::read_to_string(&path).unwrap();
            assert!(text.contains("MODEL        1\n"));
            assert!(!text.contains("MODEL        2\n"));
            assert!(text.contains("MODEL        3\n"));
        }

        #[test]
        fn nobox_strips_the_unit_cell() {
            let dir = tempdir().unwrap();
            let path = dir.path().join("out.pdb");
            let mut list = TrajoutList::new();
            list.outputs.push(TrajectoryOut::new(&path, TrajFormat::Pdb, 0, true));
            let mut frame = Frame::new(2);
            frame.periodic_box = Some(PeriodicBox::orthorhombic(5.0, 5.0, 5.0));
            list.write(0, &frame, &line_topology(2));
            list.close();
            assert!(!fs::read_to_string(&path).unwrap().contains("CRYST1"));
        }

        #[test]
        fn unwritable_path_fails_once() {
            let mut list = TrajoutList::new();
            list.outputs.push(TrajectoryOut::new("/nonexistent/dir/out.pdb", TrajFormat::Pdb, 0, false));
            let topology = line_topology(1);
            list.write(0, &Frame::new(1), &topology);
            list.write(1, &Frame::new(1), &topology);
            let output = list.iter().next().unwrap();
            assert!(output.failed);
            assert_eq!(output.frames_written(), 0);
        }
    }
}
