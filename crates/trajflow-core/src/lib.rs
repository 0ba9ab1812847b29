//! # trajflow Core Library
//!
//! A trajectory-processing engine for molecular-simulation data. Trajectories in many
//! encodings are detected by content, bound to a topology, streamed frame by frame through
//! an ordered pipeline of actions, and written back out alongside derived datasets.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Topology`, `Frame`), atom masks,
//!   topology loading, the trajectory codec registry with content-based format detection,
//!   and the rank communication layer (`World`).
//!
//! - **[`engine`]: The Logic Core.** The stateful layer: argument lists, the script reader,
//!   the chain-of-responsibility command dispatcher, the coordinate/topology lists, the
//!   action pipeline, datasets and data files, and the Setup → Run → Finalize run engine.
//!
//! - **[`workflows`]: The Public API.** Ties `engine` and `core` together into a complete
//!   "read a script, then process every trajectory" procedure.

pub mod core;
pub mod engine;
pub mod workflows;

#[cfg(test)]
pub(crate) mod test_utils;
