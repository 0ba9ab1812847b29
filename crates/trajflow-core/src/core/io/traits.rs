use crate::core::models::frame::Frame;
use crate::core::models::topology::Topology;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed {format} file '{path}': {reason}")]
    Format {
        format: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("'{path}' has {found} atoms but the topology has {expected}")]
    AtomMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("Frame {set} requested but the trajectory has {count} frames")]
    FrameOutOfRange { set: usize, count: usize },

    #[error("Trajectory is not open")]
    NotOpen,

    #[error("{0} is not supported by this format")]
    Unsupported(&'static str),
}

/// A read-only handle used during format detection.
///
/// Every read starts from the beginning of the file, so codecs probed in sequence all see
/// the same bytes regardless of what earlier probes consumed.
#[derive(Debug)]
pub struct ProbeFile {
    path: PathBuf,
    file: File,
}

impl ProbeFile {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads up to `len` bytes from the start of the file.
    pub fn read_header(&mut self, len: usize) -> io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::with_capacity(len);
        (&mut self.file).take(len as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Reads up to `n` lines from the start of the file, without line terminators.
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn read_lines(&mut self, n: usize) -> io::Result<Vec<String>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&mut self.file);
        let mut lines = Vec::with_capacity(n);
        let mut buf = Vec::new();
        for _ in 0..n {
            buf.clear();
            // Bounded so a binary file without newlines cannot be slurped whole.
            let read = (&mut reader).take(4096).read_until(b'\n', &mut buf)?;
            if read == 0 {
                break;
            }
            let text = String::from_utf8_lossy(&buf);
            lines.push(text.trim_end_matches(['\n', '\r']).to_string());
        }
        Ok(lines)
    }
}

/// The polymorphic interface over trajectory encodings.
///
/// Lifecycle for reading: `setup_read` (counts frames, validates atoms) → `open_read` →
/// any number of `read_frame` → `close`. For writing: `setup_write` → `write_frame`… →
/// `close`. Codecs are single-owner and never shared between ranks.
pub trait TrajectoryCodec: Send {
    /// Returns `true` if the probed content is in this codec's format.
    fn identify(&self, probe: &mut ProbeFile) -> io::Result<bool>;

    /// Prepares to read `path` against `topology` and returns the number of frames.
    fn setup_read(&mut self, path: &Path, topology: &Topology) -> Result<usize, CodecError>;

    fn open_read(&mut self) -> Result<(), CodecError>;

    /// Reads frame `set` (0-based) into `frame`, resizing it if needed.
    fn read_frame(&mut self, set: usize, frame: &mut Frame) -> Result<(), CodecError>;

    fn setup_write(&mut self, path: &Path, topology: &Topology) -> Result<(), CodecError>;

    /// Writes `frame` as output frame `set` (0-based).
    fn write_frame(&mut self, set: usize, frame: &Frame) -> Result<(), CodecError>;

    fn close(&mut self) -> Result<(), CodecError>;

    /// Short human-readable description of the open file.
    fn info(&self) -> String;
}

/// Per-atom labels a writer needs to emit text formats.
#[derive(Debug, Clone, Default)]
pub(crate) struct AtomLabels {
    pub names: Vec<String>,
    pub types: Vec<String>,
    pub charges: Vec<f64>,
    pub res_names: Vec<String>,
    pub res_numbers: Vec<i32>,
    pub nres: usize,
}

impl AtomLabels {
    pub fn from_topology(topology: &Topology) -> Self {
        let mut labels = Self::default();
        for atom in &topology.atoms {
            let (name, number) = topology
                .residues
                .get(atom.residue)
                .map_or(("UNK", 0), |r| (r.name.as_str(), r.number));
            labels.names.push(atom.name.clone());
            labels.types.push(atom.atom_type.clone());
            labels.charges.push(atom.charge);
            labels.res_names.push(name.to_string());
            labels.res_numbers.push(number);
        }
        labels.nres = topology.nres();
        labels
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

/// Parses whitespace-free fixed-width numeric fields from `line`.
pub(crate) fn fixed_width_values(line: &str, width: usize) -> Result<Vec<f64>, String> {
    let mut values = Vec::new();
    let mut start = 0;
    while start < line.len() {
        let end = (start + width).min(line.len());
        let field = line.get(start..end).unwrap_or("").trim();
        if !field.is_empty() {
            values.push(
                field
                    .parse()
                    .map_err(|_| format!("invalid number '{field}'"))?,
            );
        }
        start = end;
    }
    Ok(values)
}

/// Returns `true` if `line` consists only of fixed-width numbers of `width` characters with
/// `decimals` digits after the point.
pub(crate) fn is_fixed_width_line(line: &str, width: usize, decimals: usize) -> bool {
    let line = line.trim_end();
    if line.is_empty() || line.len() % width != 0 {
        return false;
    }
    line.as_bytes().chunks(width).all(|chunk| {
        let Ok(field) = std::str::from_utf8(chunk) else {
            return false;
        };
        let field = field.trim();
        match field.split_once('.') {
            Some((int, frac)) => {
                frac.len() == decimals
                    && frac.bytes().all(|b| b.is_ascii_digit())
                    && int.trim_start_matches('-').bytes().all(|b| b.is_ascii_digit())
            }
            None => false,
        }
    })
}
