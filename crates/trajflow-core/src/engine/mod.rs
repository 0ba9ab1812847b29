//! # Engine Module
//!
//! The processing engine: everything between a line of script text and the frames and
//! datasets written at the end of a run.
//!
//! ## Overview
//!
//! Script lines are read by the [`script`] reader and tokenized into [`args::ArgList`]s.
//! The [`state::PtrajState`] offers each instruction to its command handlers in a fixed
//! priority order ([`dispatch`]): input trajectories, reference frames, output trajectories,
//! built-in directives and finally action registration. Once input ends, the [`run`] engine
//! executes the Setup, Run and Finalize phases over the accumulated lists.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - run-wide settings and their builder
//! - **Scripting** ([`script`], [`args`]) - line reading, continuation, comments, tokens
//! - **Dispatch** ([`dispatch`], [`state`]) - the handler chain and the state it mutates
//! - **Lists** ([`lists`]) - topologies, input, reference and output trajectories
//! - **Actions** ([`actions`]) - the per-frame pipeline
//! - **Results** ([`datasets`], [`datafile`]) - per-frame series and the files they go to
//! - **Orchestration** ([`run`]) - phase sequencing and rank frame partitioning
//! - **Progress** ([`progress`]) and **Errors** ([`error`])

pub mod actions;
pub mod args;
pub mod config;
pub mod datafile;
pub mod datasets;
pub mod dispatch;
pub mod error;
pub mod lists;
pub mod progress;
pub mod run;
pub mod script;
pub mod state;
