//! # Workflows Module
//!
//! Top-level entry points that take a run configuration and an input script to finished
//! output files and datasets.
//!
//! ## Overview
//!
//! A workflow builds one [`PtrajState`](crate::engine::state::PtrajState) per rank, loads the
//! topologies named on the command line, feeds every script instruction through the command
//! dispatcher and, unless the script was abandoned with `quit`, runs the Setup, Run and
//! Finalize phases.
//!
//! - **Script processing** ([`process`]) - read, dispatch, run

pub mod process;
