use super::atom::Atom;
use super::frame::PeriodicBox;
use super::residue::Residue;
use std::fmt;
use std::path::{Path, PathBuf};

/// The atom and residue layout of a system, as loaded from a topology file.
///
/// `pindex` is assigned by the topology list at load time and equals load order.
/// `out_frame` counts every frame of every trajectory completed under this topology;
/// it only ever grows during a run.
#[derive(Debug, Clone)]
pub struct Topology {
    name: String,
    path: PathBuf,
    pub(crate) pindex: usize,
    pub atoms: Vec<Atom>,
    pub residues: Vec<Residue>,
    pub periodic_box: Option<PeriodicBox>,
    out_frame: usize,
}

impl Topology {
    pub fn new(path: impl AsRef<Path>, atoms: Vec<Atom>, residues: Vec<Residue>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            path,
            pindex: 0,
            atoms,
            residues,
            periodic_box: None,
            out_frame: 0,
        }
    }

    /// File name without directories; used as the `parm <name>` lookup key.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pindex(&self) -> usize {
        self.pindex
    }

    pub fn natom(&self) -> usize {
        self.atoms.len()
    }

    pub fn nres(&self) -> usize {
        self.residues.len()
    }

    pub fn out_frame(&self) -> usize {
        self.out_frame
    }

    pub(crate) fn advance_out_frame(&mut self, frames: usize) {
        self.out_frame += frames;
    }

    pub fn masses(&self) -> Vec<f64> {
        self.atoms.iter().map(|a| a.mass).collect()
    }

    pub fn residue_of(&self, atom: usize) -> Option<&Residue> {
        self.atoms.get(atom).and_then(|a| self.residues.get(a.residue))
    }

    /// One-line description of atom `index`, e.g. `  12 CA   ALA    2 CT  0.0337 12.010`.
    pub fn atom_info(&self, index: usize) -> Option<String> {
        let atom = self.atoms.get(index)?;
        let (res_name, res_num) = self
            .residues
            .get(atom.residue)
            .map_or(("?", 0), |r| (r.name.as_str(), r.number));
        Some(format!(
            "{:>6} {:<4} {:<4} {:>5} {:<4} {:>8.4} {:>8.3}",
            index + 1,
            atom.name,
            res_name,
            res_num,
            atom.atom_type,
            atom.charge,
            atom.mass
        ))
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} atoms, {} res{})",
            self.name,
            self.natom(),
            self.nres(),
            if self.periodic_box.is_some() { ", box" } else { "" }
        )
    }
}
