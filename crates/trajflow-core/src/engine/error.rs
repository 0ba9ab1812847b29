use thiserror::Error;

use super::config::ConfigError;
use super::datafile::DataFileError;
use super::script::ScriptError;
use crate::core::parallel::CommError;
use crate::core::topology::TopologyError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Communication failed: {source}")]
    Comm {
        #[from]
        source: CommError,
    },

    #[error("Input script error: {source}")]
    Script {
        #[from]
        source: ScriptError,
    },

    #[error("Topology error: {source}")]
    Topology {
        #[from]
        source: TopologyError,
    },

    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Data file output failed: {source}")]
    DataFile {
        #[from]
        source: DataFileError,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
