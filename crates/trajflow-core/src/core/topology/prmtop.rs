use super::TopologyError;
use crate::core::models::atom::Atom;
use crate::core::models::frame::PeriodicBox;
use crate::core::models::residue::Residue;
use crate::core::models::topology::Topology;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Amber stores charges multiplied by this factor (sqrt of the Coulomb constant in
/// kcal·Å/mol/e²).
const AMBER_CHARGE_FACTOR: f64 = 18.2223;

// Offsets into the POINTERS section.
const NATOM: usize = 0;
const NRES: usize = 11;
const IFBOX: usize = 27;

#[derive(Debug)]
struct Section {
    width: usize,
    first_line: usize,
    lines: Vec<String>,
}

impl Section {
    fn fields(&self) -> impl Iterator<Item = &str> {
        let width = self.width;
        self.lines.iter().flat_map(move |line| {
            (0..line.len())
                .step_by(width)
                .map(move |start| line.get(start..(start + width).min(line.len())).unwrap_or(""))
                .filter(|f| !f.trim().is_empty())
        })
    }
}

/// Extracts the field width from a Fortran format such as `(20a4)`, `(10I8)` or `(5E16.8)`.
fn format_width(spec: &str) -> Option<usize> {
    let inner = spec.trim().strip_prefix("%FORMAT(")?.split(')').next()?;
    let letter = inner.find(|c: char| c.is_ascii_alphabetic())?;
    let digits: String = inner[letter + 1..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok().filter(|&w| w > 0)
}

struct Parser<'p> {
    path: &'p Path,
    sections: HashMap<String, Section>,
}

impl<'p> Parser<'p> {
    fn new(path: &'p Path, text: &str) -> Result<Self, TopologyError> {
        let mut sections = HashMap::new();
        let mut current: Option<(String, Section)> = None;
        for (idx, line) in text.lines().enumerate() {
            if let Some(flag) = line.strip_prefix("%FLAG") {
                if let Some((name, section)) = current.take() {
                    sections.insert(name, section);
                }
                current = Some((
                    flag.trim().to_string(),
                    Section {
                        width: 0,
                        first_line: idx + 2,
                        lines: Vec::new(),
                    },
                ));
            } else if line.starts_with("%FORMAT") {
                if let Some((_, section)) = current.as_mut() {
                    section.width = format_width(line).ok_or_else(|| TopologyError::Parse {
                        path: path.to_path_buf(),
                        line: idx + 1,
                        reason: format!("unsupported format '{}'", line.trim()),
                    })?;
                    section.first_line = idx + 2;
                }
            } else if line.starts_with('%') {
                continue;
            } else if let Some((_, section)) = current.as_mut() {
                section.lines.push(line.to_string());
            }
        }
        if let Some((name, section)) = current {
            sections.insert(name, section);
        }
        Ok(Self { path, sections })
    }

    fn section(&self, flag: &str) -> Result<&Section, TopologyError> {
        let section = self.sections.get(flag).ok_or_else(|| TopologyError::Inconsistent {
            path: self.path.to_path_buf(),
            reason: format!("missing %FLAG {flag}"),
        })?;
        if section.width == 0 {
            return Err(TopologyError::Parse {
                path: self.path.to_path_buf(),
                line: section.first_line,
                reason: format!("%FLAG {flag} has no %FORMAT line"),
            });
        }
        Ok(section)
    }

    fn strings(&self, flag: &str) -> Result<Vec<String>, TopologyError> {
        Ok(self
            .section(flag)?
            .fields()
            .map(|f| f.trim().to_string())
            .collect())
    }

    fn numbers<T: std::str::FromStr>(&self, flag: &str) -> Result<Vec<T>, TopologyError> {
        let section = self.section(flag)?;
        section
            .fields()
            .map(|f| {
                f.trim().parse::<T>().map_err(|_| TopologyError::Parse {
                    path: self.path.to_path_buf(),
                    line: section.first_line,
                    reason: format!("invalid value '{}' in %FLAG {flag}", f.trim()),
                })
            })
            .collect()
    }

    fn expect_len<T>(&self, flag: &str, values: Vec<T>, len: usize) -> Result<Vec<T>, TopologyError> {
        if values.len() < len {
            return Err(TopologyError::Inconsistent {
                path: self.path.to_path_buf(),
                reason: format!("%FLAG {flag} has {} entries, expected {len}", values.len()),
            });
        }
        Ok(values)
    }
}

/// Reads an Amber `prmtop` (parm7) topology.
pub fn read(path: &Path) -> Result<Topology, TopologyError> {
    let text = fs::read_to_string(path).map_err(|source| TopologyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parser = Parser::new(path, &text)?;

    let pointers: Vec<usize> = parser.numbers("POINTERS")?;
    let pointers = parser.expect_len("POINTERS", pointers, NRES + 1)?;
    let natom = pointers[NATOM];
    let nres = pointers[NRES];

    let names = parser.expect_len("ATOM_NAME", parser.strings("ATOM_NAME")?, natom)?;
    let charges = parser.expect_len("CHARGE", parser.numbers::<f64>("CHARGE")?, natom)?;
    let masses = parser.expect_len("MASS", parser.numbers::<f64>("MASS")?, natom)?;
    let types = match parser.strings("AMBER_ATOM_TYPE") {
        Ok(types) => parser.expect_len("AMBER_ATOM_TYPE", types, natom)?,
        Err(_) => vec![String::new(); natom],
    };
    let labels = parser.expect_len("RESIDUE_LABEL", parser.strings("RESIDUE_LABEL")?, nres)?;
    let starts: Vec<usize> = parser.numbers("RESIDUE_POINTER")?;
    let starts = parser.expect_len("RESIDUE_POINTER", starts, nres)?;

    let mut residues = Vec::with_capacity(nres);
    for r in 0..nres {
        let first = starts[r].saturating_sub(1);
        let last = if r + 1 < nres { starts[r + 1].saturating_sub(1) } else { natom };
        if first > last || last > natom {
            return Err(TopologyError::Inconsistent {
                path: path.to_path_buf(),
                reason: format!("residue {} has invalid atom range {first}..{last}", r + 1),
            });
        }
        residues.push(Residue::new(&labels[r], r as i32 + 1, first, last));
    }

    let mut atoms = Vec::with_capacity(natom);
    for residue_idx in 0..nres {
        for i in residues[residue_idx].atoms() {
            atoms.push(Atom {
                name: names[i].clone(),
                atom_type: types[i].clone(),
                charge: charges[i] / AMBER_CHARGE_FACTOR,
                mass: masses[i],
                residue: residue_idx,
            });
        }
    }
    if atoms.len() != natom {
        return Err(TopologyError::Inconsistent {
            path: path.to_path_buf(),
            reason: format!("residues cover {} of {natom} atoms", atoms.len()),
        });
    }

    let mut topology = Topology::new(path, atoms, residues);
    if pointers.get(IFBOX).copied().unwrap_or(0) > 0 {
        // beta, a, b, c
        let dims: Vec<f64> = parser.numbers("BOX_DIMENSIONS")?;
        if let [beta, a, b, c, ..] = dims[..] {
            topology.periodic_box = Some(PeriodicBox {
                lengths: [a, b, c].into(),
                angles: [90.0, beta, 90.0].into(),
            });
        }
    }
    Ok(topology)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_file;
    use tempfile::tempdir;

    fn pointers_line(natom: usize, nres: usize, ifbox: usize) -> String {
        let mut values = vec![0usize; 31];
        values[NATOM] = natom;
        values[NRES] = nres;
        values[IFBOX] = ifbox;
        values
            .chunks(10)
            .map(|chunk| chunk.iter().map(|v| format!("{v:>8}")).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn sample(ifbox: usize) -> String {
        format!(
            "%VERSION  VERSION_STAMP = V0001.000\n\
%FLAG TITLE\n%FORMAT(20a4)\ntest\n\
%FLAG POINTERS\n%FORMAT(10I8)\n{}\n\
%FLAG ATOM_NAME\n%FORMAT(20a4)\nN   CA  O   \n\
%FLAG CHARGE\n%FORMAT(5E16.8)\n  1.82223000E+01 -1.82223000E+01  0.00000000E+00\n\
%FLAG MASS\n%FORMAT(5E16.8)\n  1.40100000E+01  1.20100000E+01  1.60000000E+01\n\
%FLAG RESIDUE_LABEL\n%FORMAT(20a4)\nALA WAT \n\
%FLAG RESIDUE_POINTER\n%FORMAT(10I8)\n       1       3\n\
%FLAG AMBER_ATOM_TYPE\n%FORMAT(20a4)\nN   CT  OW  \n\
%FLAG BOX_DIMENSIONS\n%FORMAT(5E16.8)\n  9.00000000E+01  2.00000000E+01  2.10000000E+01  2.20000000E+01\n",
            pointers_line(3, 2, ifbox)
        )
    }

    #[test]
    fn format_width_handles_string_integer_and_float_specs() {
        assert_eq!(format_width("%FORMAT(20a4)"), Some(4));
        assert_eq!(format_width("%FORMAT(10I8)"), Some(8));
        assert_eq!(format_width("%FORMAT(5E16.8)  "), Some(16));
        assert_eq!(format_width("%FORMAT()"), None);
    }

    #[test]
    fn reads_atoms_residues_and_scaled_charges() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "sys.parm7", &sample(0));
        let top = read(&path).unwrap();
        assert_eq!(top.natom(), 3);
        assert_eq!(top.nres(), 2);
        assert_eq!(top.atoms[1].name, "CA");
        assert_eq!(top.atoms[1].atom_type, "CT");
        assert!((top.atoms[0].charge - 1.0).abs() < 1e-9);
        assert!((top.atoms[1].charge + 1.0).abs() < 1e-9);
        assert!((top.atoms[2].mass - 16.0).abs() < 1e-9);
        assert_eq!(top.residues[0].atoms(), 0..2);
        assert_eq!(top.residues[1].atoms(), 2..3);
        assert_eq!(top.atoms[2].residue, 1);
        assert!(top.periodic_box.is_none());
    }

    #[test]
    fn reads_box_when_ifbox_is_set() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "sys.parm7", &sample(1));
        let top = read(&path).unwrap();
        let b = top.periodic_box.unwrap();
        assert_eq!(b.lengths.x, 20.0);
        assert_eq!(b.lengths.z, 22.0);
        assert_eq!(b.angles.y, 90.0);
    }

    #[test]
    fn missing_section_is_inconsistent() {
        let dir = tempdir().unwrap();
        let text = sample(0).replace("%FLAG MASS", "%FLAG NOT_MASS");
        let path = write_file(dir.path(), "sys.parm7", &text);
        let err = read(&path).unwrap_err();
        assert!(err.to_string().contains("MASS"));
    }

    #[test]
    fn bad_number_reports_section() {
        let dir = tempdir().unwrap();
        let text = sample(0).replace("  1.20100000E+01", "  xx.xxxxxxxxxxx");
        let path = write_file(dir.path(), "sys.parm7", &text);
        assert!(matches!(read(&path), Err(TopologyError::Parse { .. })));
    }
}
