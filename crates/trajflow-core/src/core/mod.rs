//! # Core Module
//!
//! Fundamental building blocks shared by every other layer of trajflow.
//!
//! ## Architecture
//!
//! - **Molecular Representation** ([`models`]) - Topologies (atoms, residues, box) and frames
//! - **Topology Loading** ([`topology`]) - Amber `prmtop` and PDB topology readers
//! - **Atom Selection** ([`mask`]) - Amber-style atom mask expressions
//! - **Trajectory I/O** ([`io`]) - The codec trait, the ordered format registry, content-based
//!   format detection, and the built-in codecs
//! - **Communication** ([`parallel`]) - Rank context and collective operations

pub mod io;
pub mod mask;
pub mod models;
pub mod parallel;
pub mod topology;
