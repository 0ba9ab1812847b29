use super::TopologyError;
use crate::core::models::atom::{Atom, guess_mass};
use crate::core::models::frame::PeriodicBox;
use crate::core::models::residue::Residue;
use crate::core::models::topology::Topology;
use nalgebra::Point3;
use phf::phf_set;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Record names accepted as evidence that a file is PDB.
pub(crate) static RECORD_KEYWORDS: phf::Set<&'static str> = phf_set! {
    "HEADER", "TITLE", "COMPND", "REMARK", "CRYST1", "MODEL", "ATOM", "HETATM", "SEQRES",
};

pub(crate) fn is_record_line(line: &str) -> bool {
    let name = line.get(..6).unwrap_or(line).trim_end();
    RECORD_KEYWORDS.contains(name)
}

pub(crate) fn is_atom_line(line: &str) -> bool {
    line.starts_with("ATOM  ") || line.starts_with("HETATM")
}

fn field(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end.min(line.len())).unwrap_or("").trim()
}

/// The fixed-column fields of an `ATOM`/`HETATM` record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AtomRecord<'a> {
    pub name: &'a str,
    pub res_name: &'a str,
    pub res_seq: i32,
    pub chain: &'a str,
    pub position: Point3<f64>,
    pub element: &'a str,
}

impl<'a> AtomRecord<'a> {
    pub fn parse(line: &'a str) -> Result<Self, String> {
        let coord = |start, end, axis| {
            let text = field(line, start, end);
            text.parse::<f64>()
                .map_err(|_| format!("invalid {axis} coordinate '{text}'"))
        };
        let res_text = field(line, 22, 26);
        let res_seq = if res_text.is_empty() {
            0
        } else {
            res_text
                .parse()
                .map_err(|_| format!("invalid residue number '{res_text}'"))?
        };
        Ok(Self {
            name: field(line, 12, 16),
            res_name: field(line, 17, 21),
            res_seq,
            chain: field(line, 21, 22),
            position: Point3::new(coord(30, 38, "x")?, coord(38, 46, "y")?, coord(46, 54, "z")?),
            element: field(line, 76, 78),
        })
    }
}

/// Parses a `CRYST1` record into a box.
pub(crate) fn parse_cryst1(line: &str) -> Option<PeriodicBox> {
    let values: Option<Vec<f64>> = [(6, 15), (15, 24), (24, 33), (33, 40), (40, 47), (47, 54)]
        .iter()
        .map(|&(s, e)| field(line, s, e).parse().ok())
        .collect();
    let v = values?;
    Some(PeriodicBox {
        lengths: [v[0], v[1], v[2]].into(),
        angles: [v[3], v[4], v[5]].into(),
    })
}

/// Reads atoms and residues from the first model of a PDB file.
pub fn read(path: &Path) -> Result<Topology, TopologyError> {
    let io_err = |source| TopologyError::Io {
        path: path.to_path_buf(),
        source,
    };
    let reader = BufReader::new(File::open(path).map_err(io_err)?);

    let mut atoms = Vec::new();
    let mut residues: Vec<Residue> = Vec::new();
    let mut current: Option<(i32, String, String)> = None;
    let mut periodic_box = None;

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(io_err)?;
        if line.starts_with("CRYST1") {
            periodic_box = parse_cryst1(&line);
        } else if line.starts_with("ENDMDL") || line.trim() == "END" {
            break;
        } else if is_atom_line(&line) {
            let record = AtomRecord::parse(&line).map_err(|reason| TopologyError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                reason,
            })?;
            let key = (
                record.res_seq,
                record.res_name.to_string(),
                record.chain.to_string(),
            );
            if current.as_ref() != Some(&key) {
                if let Some(last) = residues.last_mut() {
                    last.last_atom = atoms.len();
                }
                residues.push(Residue::new(record.res_name, record.res_seq, atoms.len(), atoms.len()));
                current = Some(key);
            }
            let mut atom = Atom::new(record.name, residues.len() - 1);
            atom.mass = guess_mass(record.name, Some(record.element));
            atoms.push(atom);
        }
    }
    if let Some(last) = residues.last_mut() {
        last.last_atom = atoms.len();
    }
    if atoms.is_empty() {
        return Err(TopologyError::Inconsistent {
            path: path.to_path_buf(),
            reason: "no ATOM/HETATM records".into(),
        });
    }

    let mut topology = Topology::new(path, atoms, residues);
    topology.periodic_box = periodic_box;
    Ok(topology)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_file;
    use tempfile::tempdir;

    const SAMPLE: &str = "\
CRYST1   30.000   40.000   50.000  90.00  90.00  90.00 P 1           1
ATOM      1  N   ALA A   1       1.000   2.000   3.000  1.00  0.00           N
ATOM      2  CA  ALA A   1       2.000   2.000   3.000  1.00  0.00           C
HETATM    3  O   HOH A   2       5.000   5.000   5.000  1.00  0.00           O
END
ATOM      4  O   HOH A   3       9.000   9.000   9.000  1.00  0.00           O
";

    #[test]
    fn record_keywords_identify_pdb_lines() {
        assert!(is_record_line("ATOM      1  N   ALA A   1"));
        assert!(is_record_line("REMARK generated"));
        assert!(is_record_line("MODEL        1"));
        assert!(!is_record_line("ATOMIC"));
        assert!(!is_record_line("    10.000   2.000"));
    }

    #[test]
    fn atom_record_parses_fixed_columns() {
        let line = "ATOM      2  CA  ALA A   1       2.000  -2.500   3.125  1.00  0.00           C";
        let record = AtomRecord::parse(line).unwrap();
        assert_eq!(record.name, "CA");
        assert_eq!(record.res_name, "ALA");
        assert_eq!(record.res_seq, 1);
        assert_eq!(record.chain, "A");
        assert_eq!(record.position, Point3::new(2.0, -2.5, 3.125));
        assert_eq!(record.element, "C");
    }

    #[test]
    fn atom_record_rejects_bad_coordinates() {
        let line = "ATOM      2  CA  ALA A   1       2.000  abcdef   3.125";
        let err = AtomRecord::parse(line).unwrap_err();
        assert!(err.contains("y coordinate"));
    }

    #[test]
    fn read_stops_at_first_end_and_groups_residues() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "sys.pdb", SAMPLE);
        let top = read(&path).unwrap();
        assert_eq!(top.natom(), 3);
        assert_eq!(top.nres(), 2);
        assert_eq!(top.residues[0].atoms(), 0..2);
        assert_eq!(top.residues[1].name, "HOH");
        assert!((top.atoms[2].mass - 16.0).abs() < 1e-9);
        let b = top.periodic_box.unwrap();
        assert_eq!(b.lengths.y, 40.0);
    }

    #[test]
    fn file_without_atoms_is_inconsistent() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "empty.pdb", "REMARK nothing\nEND\n");
        assert!(matches!(read(&path), Err(TopologyError::Inconsistent { .. })));
    }
}
