use super::{create_writer, next_line, open_reader};
use crate::core::io::traits::{AtomLabels, CodecError, ProbeFile, TrajectoryCodec};
use crate::core::models::frame::Frame;
use crate::core::models::topology::Topology;
use nalgebra::Point3;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const FORMAT: &str = "Mol2";
const MOLECULE: &str = "@<TRIPOS>MOLECULE";
const ATOM: &str = "@<TRIPOS>ATOM";
const PROBE_LINES: usize = 10;

/// Tripos Mol2; every `@<TRIPOS>MOLECULE` section is one frame.
#[derive(Debug, Default)]
pub struct Mol2Codec {
    path: PathBuf,
    natom: usize,
    offsets: Vec<u64>,
    labels: AtomLabels,
    reader: Option<BufReader<File>>,
    writer: Option<BufWriter<File>>,
}

impl Mol2Codec {
    fn malformed(&self, reason: impl Into<String>) -> CodecError {
        CodecError::Format {
            format: FORMAT,
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

impl TrajectoryCodec for Mol2Codec {
    fn identify(&self, probe: &mut ProbeFile) -> io::Result<bool> {
        Ok(probe
            .read_lines(PROBE_LINES)?
            .iter()
            .any(|l| l.trim_end() == MOLECULE))
    }

    fn setup_read(&mut self, path: &Path, topology: &Topology) -> Result<usize, CodecError> {
        self.path = path.to_path_buf();
        self.natom = topology.natom();
        self.offsets.clear();

        let mut reader = open_reader(path)?;
        let mut line = String::new();
        let mut offset = 0u64;
        // Line index within the current MOLECULE section; the counts are on line 2.
        let mut section_line: Option<usize> = None;
        loop {
            let n = next_line(&mut reader, &mut line)?;
            if n == 0 {
                break;
            }
            if line.trim_end() == MOLECULE {
                self.offsets.push(offset);
                section_line = Some(0);
            } else if let Some(idx) = section_line.as_mut() {
                *idx += 1;
                if *idx == 2 {
                    let found: usize = line
                        .split_whitespace()
                        .next()
                        .and_then(|t| t.parse().ok())
                        .ok_or_else(|| {
                            self.malformed(format!("invalid counts line '{}'", line.trim()))
                        })?;
                    if found != self.natom {
                        return Err(CodecError::AtomMismatch {
                            path: self.path.clone(),
                            expected: self.natom,
                            found,
                        });
                    }
                    section_line = None;
                }
            }
            offset += n as u64;
        }
        if self.offsets.is_empty() {
            return Err(self.malformed("no @<TRIPOS>MOLECULE sections"));
        }
        Ok(self.offsets.len())
    }

    fn open_read(&mut self) -> Result<(), CodecError> {
        self.reader = Some(open_reader(&self.path)?);
        Ok(())
    }

    fn read_frame(&mut self, set: usize, frame: &mut Frame) -> Result<(), CodecError> {
        let Some(&offset) = self.offsets.get(set) else {
            return Err(CodecError::FrameOutOfRange {
                set,
                count: self.offsets.len(),
            });
        };
        let natom = self.natom;
        let reader = self.reader.as_mut().ok_or(CodecError::NotOpen)?;
        reader.seek(SeekFrom::Start(offset))?;

        let mut line = String::new();
        let mut found_atoms = false;
        while next_line(reader, &mut line)? > 0 {
            if line.trim_end() == ATOM {
                found_atoms = true;
                break;
            }
        }
        let mut coords = Vec::with_capacity(natom);
        let mut bad_line = None;
        if found_atoms {
            while coords.len() < natom && next_line(reader, &mut line)? > 0 {
                let xyz: Option<Vec<f64>> = line
                    .split_whitespace()
                    .skip(2)
                    .take(3)
                    .map(|t| t.parse().ok())
                    .collect();
                match xyz.as_deref() {
                    Some([x, y, z]) => coords.push(Point3::new(*x, *y, *z)),
                    _ => {
                        bad_line = Some(line.trim().to_string());
                        break;
                    }
                }
            }
        }
        if !found_atoms {
            return Err(self.malformed(format!("frame {} has no {ATOM} section", set + 1)));
        }
        if let Some(text) = bad_line {
            return Err(self.malformed(format!("frame {}: invalid atom line '{text}'", set + 1)));
        }
        if coords.len() != natom {
            return Err(self.malformed(format!(
                "frame {} ended after {} of {natom} atoms",
                set + 1,
                coords.len()
            )));
        }
        frame.coords = coords;
        frame.periodic_box = None;
        frame.time = None;
        Ok(())
    }

    fn setup_write(&mut self, path: &Path, topology: &Topology) -> Result<(), CodecError> {
        self.path = path.to_path_buf();
        self.natom = topology.natom();
        self.labels = AtomLabels::from_topology(topology);
        self.writer = Some(create_writer(path)?);
        Ok(())
    }

    fn write_frame(&mut self, set: usize, frame: &Frame) -> Result<(), CodecError> {
        let labels = &self.labels;
        let writer = self.writer.as_mut().ok_or(CodecError::NotOpen)?;
        writeln!(writer, "{MOLECULE}")?;
        writeln!(writer, "Frame {}", set + 1)?;
        writeln!(writer, "{:5} {:5} {:5} {:5} {:5}", frame.natom(), 0, labels.nres, 0, 0)?;
        writeln!(writer, "SMALL")?;
        writeln!(writer, "USER_CHARGES")?;
        writeln!(writer)?;
        writeln!(writer, "{ATOM}")?;
        for (i, p) in frame.coords.iter().enumerate() {
            let name = labels.names.get(i).map_or("X", String::as_str);
            let atom_type = labels
                .types
                .get(i)
                .filter(|t| !t.is_empty())
                .map_or(name, String::as_str);
            writeln!(
                writer,
                "{:>7} {:<8} {:>10.4} {:>10.4} {:>10.4} {:<8} {:>3} {:<8} {:>10.6}",
                i + 1,
                name,
                p.x,
                p.y,
                p.z,
                atom_type,
                labels.res_numbers.get(i).copied().unwrap_or(1),
                labels.res_names.get(i).map_or("UNK", String::as_str),
                labels.charges.get(i).copied().unwrap_or(0.0)
            )?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), CodecError> {
        self.reader = None;
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }

    fn info(&self) -> String {
        format!("'{}' is a Tripos Mol2 file", self.path.display())
    }
}
