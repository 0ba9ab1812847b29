//! # Trajectory I/O
//!
//! - [`traits`] - The [`traits::TrajectoryCodec`] interface every format implements, plus the
//!   rewindable [`traits::ProbeFile`] handed to `identify`
//! - [`registry`] - The ordered format table, keyword/extension lookup, and content-based
//!   format detection
//! - [`formats`] - Built-in codecs

pub mod formats;
pub mod registry;
pub mod traits;
