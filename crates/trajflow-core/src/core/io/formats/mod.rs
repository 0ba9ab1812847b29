//! Built-in trajectory codecs. Each module is one format behind
//! [`TrajectoryCodec`](super::traits::TrajectoryCodec).

pub mod amber_restart;
pub mod amber_traj;
pub mod dcd;
pub mod gro;
pub mod mol2;
pub mod pdb;

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter};
use std::path::Path;

pub(crate) fn open_reader(path: &Path) -> io::Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path)?))
}

pub(crate) fn create_writer(path: &Path) -> io::Result<BufWriter<File>> {
    Ok(BufWriter::new(File::create(path)?))
}

/// Reads one line into `buf` (terminator stripped) and returns the bytes consumed,
/// zero at end of file.
pub(crate) fn next_line(reader: &mut impl BufRead, buf: &mut String) -> io::Result<usize> {
    buf.clear();
    let n = reader.read_line(buf)?;
    let trimmed = buf.trim_end_matches(['\n', '\r']).len();
    buf.truncate(trimmed);
    Ok(n)
}
