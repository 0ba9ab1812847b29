use crate::core::models::atom::Atom;
use crate::core::models::residue::Residue;
use crate::core::models::topology::Topology;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// `natom` carbon atoms named `C1`, `C2`, ..., each in its own `ALA` residue.
pub fn line_topology(natom: usize) -> Topology {
    let atoms = (0..natom)
        .map(|i| Atom::new(&format!("C{}", i + 1), i))
        .collect();
    let residues = (0..natom)
        .map(|i| Residue::new("ALA", i as i32 + 1, i, i + 1))
        .collect();
    Topology::new("line.pdb", atoms, residues)
}

/// A single-model PDB with `natom` atoms placed at `(i, 0, 0)`.
pub fn write_pdb_topology(dir: &Path, name: &str, natom: usize) -> PathBuf {
    let mut text = String::from("REMARK test system\n");
    for i in 0..natom {
        writeln!(
            text,
            "ATOM  {:>5}  C{:<2} ALA A{:>4}    {:8.3}{:8.3}{:8.3}  1.00  0.00           C",
            i + 1,
            i + 1,
            i + 1,
            i as f64,
            0.0,
            0.0
        )
        .unwrap();
    }
    text.push_str("END\n");
    write_file(dir, name, &text)
}

/// An Amber trajectory where atom `i` of frame `f` sits at `(i, f, 0)`.
pub fn write_crd(dir: &Path, name: &str, topology: &Topology, nframes: usize) -> PathBuf {
    let mut text = String::from("test trajectory\n");
    for f in 0..nframes {
        let values: Vec<f64> = (0..topology.natom())
            .flat_map(|i| [i as f64, f as f64, 0.0])
            .collect();
        for chunk in values.chunks(10) {
            for v in chunk {
                write!(text, "{v:8.3}").unwrap();
            }
            text.push('\n');
        }
    }
    write_file(dir, name, &text)
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SharedBuffer {
    type Writer = SharedBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Runs `f` with a thread-local subscriber and returns its result with everything it logged.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buffer = SharedBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();
    (result, logs)
}
