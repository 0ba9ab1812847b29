use super::super::args::ArgList;
use super::super::dispatch::{CommandHandler, DispatchContext, DispatchError, DispatchOutcome};
use super::InputError;
use super::topology::TopologyList;
use crate::core::io::registry::{Detected, detect_format};
use crate::core::models::frame::Frame;
use crate::core::models::topology::Topology;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct ReferenceEntry {
    path: PathBuf,
    pindex: usize,
    /// 1-based.
    frame: usize,
    label: Option<String>,
}

/// A frame loaded once during setup for actions to compare against.
#[derive(Debug, Clone)]
pub struct ReferenceFrame {
    pub name: String,
    pub path: PathBuf,
    pub pindex: usize,
    pub frame: Frame,
}

#[derive(Debug, Default)]
pub struct ReferenceFrames {
    frames: Vec<ReferenceFrame>,
}

impl ReferenceFrames {
    pub fn from_frames(frames: Vec<ReferenceFrame>) -> Self {
        Self { frames }
    }

    /// Looks a reference up by label, file name or full path.
    pub fn find(&self, name: &str) -> Option<&ReferenceFrame> {
        self.frames
            .iter()
            .find(|r| r.name == name || r.path == Path::new(name))
    }

    pub fn first(&self) -> Option<&ReferenceFrame> {
        self.frames.first()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn info(&self) {
        if self.frames.is_empty() {
            return;
        }
        info!("Reference frames:");
        for (i, r) in self.frames.iter().enumerate() {
            info!("  {i}: {} ({} atoms) from {}", r.name, r.frame.natom(), r.path.display());
        }
    }
}

#[derive(Debug, Default)]
pub struct ReferenceList {
    entries: Vec<ReferenceEntry>,
}

fn load_frame(path: &Path, frame: usize, topology: &Topology) -> Result<Frame, InputError> {
    let Detected { mut codec, .. } = detect_format(path)?;
    let count = codec.setup_read(path, topology)?;
    if frame > count {
        return Err(InputError::FrameOutOfRange {
            path: path.to_path_buf(),
            frame,
            count,
        });
    }
    codec.open_read()?;
    let mut loaded = Frame::default();
    let read = codec.read_frame(frame - 1, &mut loaded);
    codec.close()?;
    read?;
    Ok(loaded)
}

impl ReferenceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reads every reference frame. References that fail to load are skipped with a warning.
    pub fn setup_ref_frames(&self, topologies: &TopologyList) -> ReferenceFrames {
        let mut frames = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let Some(topology) = topologies.get(entry.pindex) else {
                warn!(path = %entry.path.display(), "Topology {} is not loaded; skipping reference.", entry.pindex);
                continue;
            };
            match load_frame(&entry.path, entry.frame, topology) {
                Ok(frame) => {
                    let name = entry.label.clone().unwrap_or_else(|| {
                        entry
                            .path
                            .file_name()
                            .map_or_else(|| entry.path.display().to_string(), |n| n.to_string_lossy().into_owned())
                    });
                    debug!(name = %name, frame = entry.frame, "Loaded reference frame.");
                    frames.push(ReferenceFrame {
                        name,
                        path: entry.path.clone(),
                        pindex: entry.pindex,
                        frame,
                    });
                }
                Err(e) => {
                    warn!(path = %entry.path.display(), error = %e, "Could not load reference; skipping.");
                }
            }
        }
        ReferenceFrames { frames }
    }
}

impl CommandHandler for ReferenceList {
    fn try_dispatch(
        &mut self,
        args: &mut ArgList,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<DispatchOutcome, DispatchError> {
        if !args.command_is("reference") {
            return Ok(DispatchOutcome::Unrecognized);
        }
        let pindex = ctx.topologies.resolve(args)?;
        let label = args.key_string("name")?;
        let path = args
            .next_string()
            .ok_or(DispatchError::MissingFileName { command: "reference" })?;
        let frame = args.next_integer(1);
        let frame = usize::try_from(frame)
            .ok()
            .filter(|&f| f > 0)
            .ok_or(DispatchError::InvalidValue {
                key: "frame",
                reason: format!("{frame} is not a positive frame number"),
            })?;
        self.entries.push(ReferenceEntry {
            path: PathBuf::from(path),
            pindex,
            frame,
            label,
        });
        Ok(DispatchOutcome::Accepted)
    }
}
