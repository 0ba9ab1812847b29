//! The Setup → Run → Finalize sequence over a fully dispatched [`PtrajState`].
//!
//! Each rank runs this on its own state. Input frames are split by [`rank_window`] so every
//! rank reads a contiguous share of every trajectory, writes those frames under their global
//! output index, and stores per-frame results under their global frame number. The only
//! collective is the dataset merge in Finalize.
//!
//! [`rank_window`]: super::lists::trajin::rank_window

use super::actions::ActionInit;
use super::error::EngineError;
use super::lists::trajin::{BeginOutcome, SkipReason};
use super::progress::{Progress, ProgressReporter};
use super::state::PtrajState;
use crate::core::parallel::World;
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// Frame counts of one rank's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Frames this rank read from input trajectories.
    pub frames_read: usize,
    /// Frames this rank passed through the action pipeline.
    pub frames_processed: usize,
    /// Frames all ranks together are set to read.
    pub frames_total: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Read {} frames and processed {} frames.",
            self.frames_read, self.frames_processed
        )
    }
}

pub struct RunEngine<'s, 'w, 'r> {
    state: &'s mut PtrajState,
    world: &'w World,
    reporter: &'r ProgressReporter<'r>,
}

impl<'s, 'w, 'r> RunEngine<'s, 'w, 'r> {
    /// Runs all three phases once, in order.
    ///
    /// Trajectories that cannot be opened, or whose topology the actions cannot be bound
    /// to, are skipped; Finalize is reached for whatever was processed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Comm`] when the dataset merge fails and
    /// [`EngineError::DataFile`] when the coordinator cannot write a data file.
    #[instrument(skip_all, name = "run_engine", fields(rank = world.rank()))]
    pub fn run(
        state: &'s mut PtrajState,
        world: &'w World,
        reporter: &'r ProgressReporter<'r>,
    ) -> Result<RunSummary, EngineError> {
        let mut engine = Self {
            state,
            world,
            reporter,
        };
        let total = engine.setup();
        let mut summary = engine.process();
        summary.frames_total = total;
        engine.finalize()?;
        Ok(summary)
    }

    fn setup(&mut self) -> usize {
        self.reporter.report(Progress::PhaseStart { name: "Setup" });
        let master = self.world.is_master();
        let state = &mut *self.state;

        if master {
            info!("Input trajectories:");
        }
        let total = state.trajin.setup_frames(&state.topologies, self.world);
        if state.trajin.is_empty() {
            warn!("No input trajectories were given.");
        }
        if master {
            state.topologies.print();
        }

        let references = state.reference.setup_ref_frames(&state.topologies);
        if master {
            references.info();
            state.trajout.info();
        }

        state.datasets.set_max(total);
        state.actions.init(&mut ActionInit {
            datasets: &mut state.datasets,
            data_files: &mut state.data_files,
            references: &references,
        });
        debug!(
            total,
            actions = state.actions.active(),
            datasets = state.datasets.len(),
            "Setup complete."
        );
        self.reporter.report(Progress::PhaseFinish);
        total
    }

    fn process(&mut self) -> RunSummary {
        self.reporter.report(Progress::PhaseStart { name: "Run" });
        let (rank, size) = (self.world.rank(), self.world.size());
        let PtrajState {
            topologies,
            trajin,
            trajout,
            actions,
            datasets,
            settings,
            ..
        } = &mut *self.state;

        let mut active_topology: Option<usize> = None;
        let mut global_set = 0;
        let mut action_set = 0;
        let mut process_set = 0;

        for trajectory in trajin.iter_mut() {
            match trajectory.begin(self.world, &mut action_set) {
                BeginOutcome::Ready => {}
                BeginOutcome::Skip(SkipReason::NoFramesForRank) => {
                    debug!(path = %trajectory.path().display(), "No frames for this rank.");
                    trajectory.end();
                    if let Some(topology) = topologies.get_mut(trajectory.pindex()) {
                        topology.advance_out_frame(trajectory.total_read_frames());
                    }
                    continue;
                }
                BeginOutcome::Skip(reason) => {
                    debug!(path = %trajectory.path().display(), ?reason, "Skipping trajectory.");
                    trajectory.end();
                    continue;
                }
            }
            let pindex = trajectory.pindex();
            let Some(topology) = topologies.get(pindex) else {
                trajectory.end();
                continue;
            };

            if active_topology != Some(pindex) && actions.setup(topology).is_err() {
                warn!("Could not set up actions for {}: skipping.", topology.name());
                // Stages may be half-bound to this topology now.
                active_topology = None;
                trajectory.end();
                continue;
            }

            let mut output_set = rank * (trajectory.total_read_frames() / size) + topology.out_frame();
            let window = trajectory.window();
            self.reporter.report(Progress::TaskStart {
                label: trajectory.path().display().to_string(),
                total_steps: window.len() as u64,
            });
            if settings.debug > 0 {
                info!(
                    rank,
                    path = %trajectory.path().display(),
                    action_set,
                    output_set,
                    "Processing frames {} to {}.",
                    window.start + 1,
                    window.end
                );
            }

            while let Some(frame) = trajectory.next_frame(&mut global_set) {
                actions.do_actions(frame, action_set, datasets);
                trajout.write(output_set, frame, topology);
                output_set += 1;
                action_set += 1;
                process_set += 1;
                self.reporter.report(Progress::TaskIncrement);
            }

            trajectory.end();
            self.reporter.report(Progress::TaskFinish);
            let total_read = trajectory.total_read_frames();
            if let Some(topology) = topologies.get_mut(pindex) {
                topology.advance_out_frame(total_read);
            }
            active_topology = Some(pindex);
        }

        let summary = RunSummary {
            frames_read: global_set,
            frames_processed: process_set,
            frames_total: 0,
        };
        info!(rank, "{summary}");
        self.reporter.report(Progress::PhaseFinish);
        summary
    }

    fn finalize(&mut self) -> Result<(), EngineError> {
        self.reporter.report(Progress::PhaseStart { name: "Finalize" });
        let master = self.world.is_master();
        let state = &mut *self.state;

        state.trajout.close();
        state.actions.print(&state.datasets);
        if master {
            state.datasets.info();
            state.data_files.info(&state.datasets);
        }
        state.datasets.sync(self.world)?;
        if master {
            state.data_files.write(&state.datasets)?;
        }
        self.reporter.report(Progress::PhaseFinish);
        Ok(())
    }
}
