//! # Core Models Module
//!
//! Plain data types describing molecular systems as the engine sees them.
//!
//! - [`atom`] - A single atom: name, force-field type, charge, mass, owning residue
//! - [`residue`] - A contiguous run of atoms sharing a residue name and number
//! - [`topology`] - The atom/residue layout of a system plus its output-frame counter
//! - [`frame`] - One snapshot of coordinates, with optional periodic box and time
//!
//! Topologies are loaded once and then only read, except for the output-frame counter,
//! which the run engine advances after each completed trajectory.

pub mod atom;
pub mod frame;
pub mod residue;
pub mod topology;
