use phf::phf_map;

/// Standard atomic masses (amu) keyed by element symbol, used when a topology format
/// carries no explicit masses.
static ELEMENT_MASSES: phf::Map<&'static str, f64> = phf_map! {
    "H" => 1.008,
    "C" => 12.01,
    "N" => 14.01,
    "O" => 16.00,
    "F" => 19.00,
    "NA" => 22.99,
    "MG" => 24.305,
    "P" => 30.97,
    "S" => 32.06,
    "CL" => 35.45,
    "K" => 39.10,
    "CA" => 40.08,
    "FE" => 55.85,
    "ZN" => 65.38,
    "BR" => 79.90,
    "I" => 126.9,
};

/// An atom in a topology.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// Atom name, e.g. `CA`.
    pub name: String,
    /// Force-field atom type; empty when the source format has none.
    pub atom_type: String,
    /// Partial charge in elementary charge units.
    pub charge: f64,
    /// Mass in amu.
    pub mass: f64,
    /// Index of the owning residue in [`super::topology::Topology::residues`].
    pub residue: usize,
}

impl Atom {
    pub fn new(name: &str, residue: usize) -> Self {
        Self {
            name: name.to_string(),
            atom_type: String::new(),
            charge: 0.0,
            mass: guess_mass(name, None),
            residue,
        }
    }
}

/// Guesses an atomic mass from an explicit element symbol or, failing that, from the
/// leading letters of the atom name. Unknown elements weigh 1.0.
pub fn guess_mass(name: &str, element: Option<&str>) -> f64 {
    if let Some(symbol) = element.map(str::trim).filter(|s| !s.is_empty()) {
        if let Some(mass) = ELEMENT_MASSES.get(symbol.to_ascii_uppercase().as_str()) {
            return *mass;
        }
    }
    let letters: String = name
        .trim()
        .chars()
        .skip_while(|c| c.is_ascii_digit())
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    // Two-letter symbols only when the name is exactly that element (e.g. "CL", "FE"),
    // so protein "CA" atoms stay carbon.
    if letters.len() == 2 && name.trim().len() == 2 && letters != "CA" {
        if let Some(mass) = ELEMENT_MASSES.get(letters.as_str()) {
            return *mass;
        }
    }
    letters
        .get(..1)
        .and_then(|first| ELEMENT_MASSES.get(first))
        .copied()
        .unwrap_or(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_atom_guesses_mass_from_name() {
        let atom = Atom::new("CA", 3);
        assert_eq!(atom.residue, 3);
        assert!((atom.mass - 12.01).abs() < 1e-9);
        assert!(atom.atom_type.is_empty());
    }

    #[test]
    fn explicit_element_takes_precedence() {
        assert!((guess_mass("CA", Some("CA")) - 40.08).abs() < 1e-9);
        assert!((guess_mass("X1", Some("S")) - 32.06).abs() < 1e-9);
    }

    #[test]
    fn leading_digits_are_skipped() {
        assert!((guess_mass("1HB", None) - 1.008).abs() < 1e-9);
    }

    #[test]
    fn two_letter_element_names_are_recognized() {
        assert!((guess_mass("CL", None) - 35.45).abs() < 1e-9);
        assert!((guess_mass("Fe", None) - 55.85).abs() < 1e-9);
    }

    #[test]
    fn unknown_names_weigh_one() {
        assert_eq!(guess_mass("XX9", None), 1.0);
        assert_eq!(guess_mass("", None), 1.0);
    }
}
