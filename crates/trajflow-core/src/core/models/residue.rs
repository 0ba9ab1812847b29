use std::ops::Range;

/// A residue covers the half-open atom index range `[first_atom, last_atom)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Residue {
    pub name: String,
    /// Residue number as written in the source file (1-based for Amber topologies).
    pub number: i32,
    pub first_atom: usize,
    pub last_atom: usize,
}

impl Residue {
    pub fn new(name: &str, number: i32, first_atom: usize, last_atom: usize) -> Self {
        Self {
            name: name.trim().to_string(),
            number,
            first_atom,
            last_atom,
        }
    }

    pub fn atoms(&self) -> Range<usize> {
        self.first_atom..self.last_atom
    }

    pub fn len(&self) -> usize {
        self.last_atom.saturating_sub(self.first_atom)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
