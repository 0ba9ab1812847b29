//! The per-frame action pipeline.
//!
//! Actions are created from their instruction at registration, initialized once during
//! Setup (data sets, data files, reference frames), bound to a topology every time the
//! active topology changes, and then run on every frame in registration order.

mod center;
mod distance;
mod radgyr;
mod rmsd;
mod translate;

use super::args::{ArgError, ArgList};
use super::datafile::DataFileList;
use super::datasets::{DataSetError, DataSetId, DataSetList};
use super::dispatch::{CommandHandler, DispatchContext, DispatchError, DispatchOutcome};
use super::lists::reference::ReferenceFrames;
use crate::core::mask::{AtomMask, MaskError};
use crate::core::models::frame::Frame;
use crate::core::models::topology::Topology;
use phf::phf_map;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Invalid arguments: {source}")]
    Args {
        #[from]
        source: ArgError,
    },
    #[error("Invalid mask: {source}")]
    Mask {
        #[from]
        source: MaskError,
    },
    #[error("Data set error: {source}")]
    DataSet {
        #[from]
        source: DataSetError,
    },
    #[error("'{action}' requires {what}")]
    MissingArgument {
        action: &'static str,
        what: &'static str,
    },
    #[error("Mask {mask} selects no atoms in {topology}")]
    EmptyMask { mask: String, topology: String },
    #[error("Reference '{0}' was not loaded")]
    ReferenceNotFound(String),
    #[error("No reference frames were loaded")]
    NoReference,
    #[error("Reference has {reference} atoms but the topology has {topology}")]
    ReferenceMismatch { reference: usize, topology: usize },
    #[error("Action used before being set up")]
    NotSetUp,
    #[error("Numerical failure: {0}")]
    Numerical(String),
}

/// Everything an action may need while initializing.
pub struct ActionInit<'a> {
    pub datasets: &'a mut DataSetList,
    pub data_files: &'a mut DataFileList,
    pub references: &'a ReferenceFrames,
}

impl ActionInit<'_> {
    /// Creates the data set `name`, attaching it to `out` when a file was requested.
    pub fn add_dataset(&mut self, name: &str, out: Option<&str>) -> Result<DataSetId, ActionError> {
        let id = self.datasets.add(name)?;
        if let Some(path) = out {
            self.data_files.add(path, id);
        }
        Ok(id)
    }
}

pub trait Action: Send {
    fn name(&self) -> &'static str;

    fn init(&mut self, init: &mut ActionInit<'_>) -> Result<(), ActionError>;

    /// Binds the action to `topology`.
    fn setup(&mut self, topology: &Topology) -> Result<(), ActionError>;

    /// Processes one frame; `frame_num` is the frame's global index.
    fn do_action(
        &mut self,
        frame: &mut Frame,
        frame_num: usize,
        datasets: &mut DataSetList,
    ) -> Result<(), ActionError>;

    fn print(&mut self, _datasets: &DataSetList) {}
}

type ActionFactory = fn(&mut ArgList) -> Result<Box<dyn Action>, ActionError>;

static ACTIONS: phf::Map<&'static str, ActionFactory> = phf_map! {
    "distance" => distance::build as ActionFactory,
    "radgyr" => radgyr::build as ActionFactory,
    "rms" => rmsd::build as ActionFactory,
    "rmsd" => rmsd::build as ActionFactory,
    "center" => center::build as ActionFactory,
    "translate" => translate::build as ActionFactory,
};

/// Sets up `mask` on `topology`, failing when it selects nothing.
pub(crate) fn setup_mask(mask: &mut AtomMask, topology: &Topology) -> Result<(), ActionError> {
    if mask.setup(topology) == 0 {
        return Err(ActionError::EmptyMask {
            mask: mask.to_string(),
            topology: topology.name().to_string(),
        });
    }
    Ok(())
}

pub(crate) fn mask_or_all(args: &mut ArgList) -> Result<AtomMask, ActionError> {
    Ok(match args.next_mask() {
        Some(expr) => AtomMask::new(&expr)?,
        None => AtomMask::all(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageState {
    Registered,
    Initialized,
    Bound { pindex: usize },
    Excluded,
}

struct Stage {
    action: Box<dyn Action>,
    state: StageState,
}

#[derive(Default)]
pub struct ActionList {
    stages: Vec<Stage>,
}

impl ActionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Box<dyn Action>) {
        self.stages.push(Stage {
            action,
            state: StageState::Registered,
        });
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Number of stages still taking part in the run.
    pub fn active(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.state != StageState::Excluded)
            .count()
    }

    /// Initializes every registered stage; a stage that fails is excluded from the run.
    pub fn init(&mut self, init: &mut ActionInit<'_>) {
        for (i, stage) in self.stages.iter_mut().enumerate() {
            if stage.state != StageState::Registered {
                continue;
            }
            match stage.action.init(init) {
                Ok(()) => stage.state = StageState::Initialized,
                Err(e) => {
                    warn!(action = stage.action.name(), error = %e, "Action {i} failed to initialize; it will be skipped.");
                    stage.state = StageState::Excluded;
                }
            }
        }
    }

    /// Binds every initialized stage to `topology`.
    ///
    /// Stops at the first stage that cannot be bound; the topology is then unusable.
    pub fn setup(&mut self, topology: &Topology) -> Result<(), ActionError> {
        for stage in &mut self.stages {
            if matches!(stage.state, StageState::Registered | StageState::Excluded) {
                continue;
            }
            stage.state = StageState::Initialized;
            stage.action.setup(topology).inspect_err(|e| {
                warn!(action = stage.action.name(), topology = topology.name(), error = %e, "Action setup failed.");
            })?;
            stage.state = StageState::Bound {
                pindex: topology.pindex(),
            };
        }
        Ok(())
    }

    /// Runs every bound stage on `frame`, in registration order.
    pub fn do_actions(&mut self, frame: &mut Frame, frame_num: usize, datasets: &mut DataSetList) {
        for stage in &mut self.stages {
            if !matches!(stage.state, StageState::Bound { .. }) {
                continue;
            }
            if let Err(e) = stage.action.do_action(frame, frame_num, datasets) {
                warn!(action = stage.action.name(), frame = frame_num + 1, error = %e, "Action failed on frame.");
            }
        }
    }

    pub fn print(&mut self, datasets: &DataSetList) {
        for stage in &mut self.stages {
            if stage.state != StageState::Excluded {
                stage.action.print(datasets);
            }
        }
    }
}

impl CommandHandler for ActionList {
    fn try_dispatch(
        &mut self,
        args: &mut ArgList,
        _ctx: &mut DispatchContext<'_>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let Some(build) = args.command().and_then(|c| ACTIONS.get(c)) else {
            return Ok(DispatchOutcome::Unrecognized);
        };
        args.mark_command();
        let action = build(args)?;
        debug!(action = action.name(), "Registered action {}.", self.stages.len());
        self.push(action);
        Ok(DispatchOutcome::Accepted)
    }
}
