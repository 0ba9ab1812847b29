//! The lists the dispatcher fills and the run engine consumes.

pub mod reference;
pub mod topology;
pub mod trajin;
pub mod trajout;

use crate::core::io::registry::DetectError;
use crate::core::io::traits::CodecError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to prepare an input file for reading.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Format detection failed: {source}")]
    Detect {
        #[from]
        source: DetectError,
    },
    #[error("Codec error: {source}")]
    Codec {
        #[from]
        source: CodecError,
    },
    #[error("Frame {frame} requested from '{path}', which has {count} frames")]
    FrameOutOfRange {
        path: PathBuf,
        frame: usize,
        count: usize,
    },
}
