use super::{create_writer, next_line, open_reader};
use crate::core::io::traits::{
    AtomLabels, CodecError, ProbeFile, TrajectoryCodec, fixed_width_values, is_fixed_width_line,
};
use crate::core::models::frame::{Frame, PeriodicBox};
use crate::core::models::topology::Topology;
use nalgebra::{Point3, Vector3};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const FORMAT: &str = "GRO";
const NM_TO_ANGSTROM: f64 = 10.0;
const COORD_COLUMNS: std::ops::Range<usize> = 20..44;

/// Gromacs `.gro`: title, atom count, fixed-column atom lines in nm, box line.
/// Consecutive blocks in one file are frames.
#[derive(Debug, Default)]
pub struct GroCodec {
    path: PathBuf,
    natom: usize,
    offsets: Vec<u64>,
    labels: AtomLabels,
    reader: Option<BufReader<File>>,
    writer: Option<BufWriter<File>>,
}

impl GroCodec {
    fn malformed(&self, reason: impl Into<String>) -> CodecError {
        CodecError::Format {
            format: FORMAT,
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

/// Parses the `t=` field some writers put in the title.
fn title_time(title: &str) -> Option<f64> {
    let (_, rest) = title.split_once("t=")?;
    rest.split_whitespace().next()?.parse().ok()
}

impl TrajectoryCodec for GroCodec {
    fn identify(&self, probe: &mut ProbeFile) -> io::Result<bool> {
        let lines = probe.read_lines(3)?;
        if lines.len() < 3 || lines[1].trim().parse::<usize>().is_err() {
            return Ok(false);
        }
        Ok(lines[2]
            .get(COORD_COLUMNS)
            .is_some_and(|c| is_fixed_width_line(c, 8, 3)))
    }

    fn setup_read(&mut self, path: &Path, topology: &Topology) -> Result<usize, CodecError> {
        self.path = path.to_path_buf();
        self.natom = topology.natom();
        self.offsets.clear();

        let mut reader = open_reader(path)?;
        let mut line = String::new();
        let mut offset = 0u64;
        loop {
            let title_bytes = next_line(&mut reader, &mut line)?;
            if title_bytes == 0 || line.trim().is_empty() {
                break;
            }
            let start = offset;
            offset += title_bytes as u64;

            let n = next_line(&mut reader, &mut line)?;
            let found: usize = line.trim().parse().map_err(|_| {
                self.malformed(format!(
                    "frame {}: invalid atom count '{}'",
                    self.offsets.len() + 1,
                    line.trim()
                ))
            })?;
            if found != self.natom {
                return Err(CodecError::AtomMismatch {
                    path: self.path.clone(),
                    expected: self.natom,
                    found,
                });
            }
            offset += n as u64;

            // atom lines plus the box line
            for _ in 0..=self.natom {
                let n = next_line(&mut reader, &mut line)?;
                if n == 0 {
                    return Err(self.malformed(format!(
                        "frame {} is truncated",
                        self.offsets.len() + 1
                    )));
                }
                offset += n as u64;
            }
            self.offsets.push(start);
        }
        if self.offsets.is_empty() {
            return Err(self.malformed("no frames"));
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
        next_line(reader, &mut line)?;
        let time = title_time(&line);
        next_line(reader, &mut line)?;

        let mut rows = Vec::with_capacity(natom + 1);
        for _ in 0..=natom {
            next_line(reader, &mut line)?;
            rows.push(line.clone());
        }

        let mut coords = Vec::with_capacity(natom);
        for (i, row) in rows[..natom].iter().enumerate() {
            let values = row
                .get(COORD_COLUMNS)
                .ok_or_else(|| format!("atom line {} is too short", i + 1))
                .and_then(|c| fixed_width_values(c, 8))
                .map_err(|reason| self.malformed(format!("frame {}: {reason}", set + 1)))?;
            let [x, y, z] = values[..] else {
                return Err(self.malformed(format!("frame {}: atom {} lacks coordinates", set + 1, i + 1)));
            };
            coords.push(Point3::new(x, y, z) * NM_TO_ANGSTROM);
        }
        let box_values: Vec<f64> = rows[natom]
            .split_whitespace()
            .filter_map(|t| t.parse().ok())
            .collect();

        frame.coords = coords;
        frame.periodic_box = match box_values[..] {
            [a, b, c, ..] if a > 0.0 && b > 0.0 && c > 0.0 => Some(PeriodicBox::orthorhombic(
                a * NM_TO_ANGSTROM,
                b * NM_TO_ANGSTROM,
                c * NM_TO_ANGSTROM,
            )),
            _ => None,
        };
        frame.time = time;
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
        match frame.time {
            Some(t) => writeln!(writer, "Generated by trajflow frame {} t= {t:.5}", set + 1)?,
            None => writeln!(writer, "Generated by trajflow frame {}", set + 1)?,
        }
        writeln!(writer, "{:5}", frame.natom())?;
        for (i, p) in frame.coords.iter().enumerate() {
            let nm = p.coords / NM_TO_ANGSTROM;
            writeln!(
                writer,
                "{:>5}{:<5.5}{:>5.5}{:>5}{:8.3}{:8.3}{:8.3}",
                labels.res_numbers.get(i).copied().unwrap_or(1) % 100_000,
                labels.res_names.get(i).map_or("UNK", String::as_str),
                labels.names.get(i).map_or("X", String::as_str),
                (i + 1) % 100_000,
                nm.x,
                nm.y,
                nm.z
            )?;
        }
        let lengths = frame
            .periodic_box
            .map(|b| b.lengths / NM_TO_ANGSTROM)
            .unwrap_or_else(Vector3::zeros);
        writeln!(writer, "{:10.5}{:10.5}{:10.5}", lengths.x, lengths.y, lengths.z)?;
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
        format!("'{}' is a Gromacs GRO file", self.path.display())
    }
}
