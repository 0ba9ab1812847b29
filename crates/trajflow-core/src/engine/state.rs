use super::actions::ActionList;
use super::args::ArgList;
use super::config::RunConfig;
use super::datafile::DataFileList;
use super::datasets::DataSetList;
use super::dispatch::{self, CommandHandler, DispatchContext, DispatchError, DispatchOutcome, Directives};
use super::lists::reference::ReferenceList;
use super::lists::topology::TopologyList;
use super::lists::trajin::TrajinList;
use super::lists::trajout::TrajoutList;
use crate::core::topology::TopologyError;

/// Settings the script itself may change.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub debug: u32,
    pub progress: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: 0,
            progress: true,
        }
    }
}

/// Everything one rank accumulates while reading its script.
pub struct PtrajState {
    pub topologies: TopologyList,
    pub trajin: TrajinList,
    pub reference: ReferenceList,
    pub trajout: TrajoutList,
    pub actions: ActionList,
    pub datasets: DataSetList,
    pub data_files: DataFileList,
    pub settings: Settings,
    rank: usize,
    size: usize,
}

impl PtrajState {
    /// State for rank `rank` of a group of `size` ranks. The group shape comes from the
    /// running `World`, not from the requested rank count.
    pub fn new(config: &RunConfig, rank: usize, size: usize) -> Self {
        Self {
            topologies: TopologyList::new(),
            trajin: TrajinList::new(),
            reference: ReferenceList::new(),
            trajout: TrajoutList::new(),
            actions: ActionList::new(),
            datasets: DataSetList::new(),
            data_files: DataFileList::new(config.data_precision),
            settings: Settings {
                debug: config.debug,
                progress: config.progress,
            },
            rank,
            size,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Loads the topologies named on the command line, in order.
    pub fn load_topologies(&mut self, config: &RunConfig) -> Result<(), TopologyError> {
        for path in &config.topologies {
            self.topologies.add(path)?;
        }
        Ok(())
    }

    /// Offers one instruction to the handlers in priority order: input trajectories,
    /// reference frames, output trajectories, directives, then actions.
    pub fn dispatch(&mut self, line: &str) -> Result<DispatchOutcome, DispatchError> {
        let mut args = ArgList::new(line);
        let mut directives = Directives;
        let mut handlers: [&mut dyn CommandHandler; 5] = [
            &mut self.trajin,
            &mut self.reference,
            &mut self.trajout,
            &mut directives,
            &mut self.actions,
        ];
        let mut ctx = DispatchContext {
            topologies: &mut self.topologies,
            settings: &mut self.settings,
            rank: self.rank,
            size: self.size,
        };
        dispatch::dispatch(&mut handlers, &mut args, &mut ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::RunConfigBuilder;
    use crate::test_utils::write_pdb_topology;
    use tempfile::tempdir;

    fn state(ranks: usize, rank: usize) -> PtrajState {
        let config = RunConfigBuilder::new()
            .ranks(ranks)
            .max_line_length(1024)
            .data_precision(3)
            .build()
            .unwrap();
        PtrajState::new(&config, rank, ranks)
    }

    #[test]
    fn instructions_reach_the_matching_list() {
        let dir = tempdir().unwrap();
        let parm = write_pdb_topology(dir.path(), "sys.pdb", 3);
        let mut state = state(1, 0);

        assert_eq!(state.dispatch(&format!("parm {}", parm.display())).unwrap(), DispatchOutcome::Accepted);
        assert_eq!(state.dispatch("trajin md.crd 1 10").unwrap(), DispatchOutcome::Accepted);
        assert_eq!(state.dispatch("trajout out.pdb").unwrap(), DispatchOutcome::Accepted);
        assert_eq!(state.dispatch("radgyr rg").unwrap(), DispatchOutcome::Accepted);
        assert_eq!(state.dispatch("noprogress").unwrap(), DispatchOutcome::Accepted);
        assert_eq!(state.dispatch("strip :WAT").unwrap(), DispatchOutcome::Unrecognized);

        assert_eq!(state.topologies.len(), 1);
        assert_eq!(state.trajin.len(), 1);
        assert_eq!(state.trajout.len(), 1);
        assert_eq!(state.actions.len(), 1);
        assert!(!state.settings.progress);
    }

    #[test]
    fn rank_and_size_shape_output_paths() {
        let dir = tempdir().unwrap();
        let parm = write_pdb_topology(dir.path(), "sys.pdb", 3);
        let mut state = state(2, 1);
        state.dispatch(&format!("parm {}", parm.display())).unwrap();
        state.dispatch("trajout out.pdb").unwrap();
        let output = state.trajout.iter().next().unwrap();
        assert_eq!(output.path(), std::path::Path::new("out.pdb.1"));
        assert_eq!((state.rank(), state.size()), (1, 2));
    }

    #[test]
    fn command_line_topologies_load_first() {
        let dir = tempdir().unwrap();
        let parm = write_pdb_topology(dir.path(), "sys.pdb", 3);
        let config = RunConfigBuilder::new()
            .ranks(1)
            .max_line_length(1024)
            .data_precision(3)
            .topology(&parm)
            .build()
            .unwrap();
        let mut state = PtrajState::new(&config, 0, 1);
        state.load_topologies(&config).unwrap();
        assert_eq!(state.topologies.get(0).unwrap().natom(), 3);
    }
}
