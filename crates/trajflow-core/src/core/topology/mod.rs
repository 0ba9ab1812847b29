//! Topology loading.
//!
//! [`load`] picks a reader by content: files carrying Amber `%VERSION`/`%FLAG` headers are
//! read as `prmtop`, files whose first lines are PDB records are read as PDB.

pub mod pdb;
pub mod prmtop;

use crate::core::models::topology::Topology;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("Cannot read topology '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Parse error in '{path}' at line {line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("Could not determine the topology format of '{0}'")]
    Unrecognized(PathBuf),
    #[error("Inconsistent topology '{path}': {reason}")]
    Inconsistent { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyFormat {
    AmberPrmtop,
    Pdb,
}

const PROBE_LINES: usize = 10;

/// Detects the topology format of `path` from its first lines.
pub fn detect(path: &Path) -> Result<TopologyFormat, TopologyError> {
    let io_err = |source| TopologyError::Io {
        path: path.to_path_buf(),
        source,
    };
    let reader = BufReader::new(File::open(path).map_err(io_err)?);
    for line in reader.lines().take(PROBE_LINES) {
        let line = line.map_err(io_err)?;
        if line.starts_with("%VERSION") || line.starts_with("%FLAG") {
            return Ok(TopologyFormat::AmberPrmtop);
        }
        if pdb::is_record_line(&line) {
            return Ok(TopologyFormat::Pdb);
        }
    }
    Err(TopologyError::Unrecognized(path.to_path_buf()))
}

/// Loads a topology, detecting its format by content.
pub fn load(path: impl AsRef<Path>) -> Result<Topology, TopologyError> {
    let path = path.as_ref();
    let format = detect(path)?;
    debug!(path = %path.display(), ?format, "Loading topology.");
    match format {
        TopologyFormat::AmberPrmtop => prmtop::read(path),
        TopologyFormat::Pdb => pdb::read(path),
    }
}
