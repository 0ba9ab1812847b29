use super::{create_writer, next_line, open_reader};
use crate::core::io::traits::{AtomLabels, CodecError, ProbeFile, TrajectoryCodec};
use crate::core::models::frame::{Frame, PeriodicBox};
use crate::core::models::topology::Topology;
use crate::core::topology::pdb::{AtomRecord, is_atom_line, is_record_line, parse_cryst1};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const FORMAT: &str = "PDB";

/// Multi-model PDB. Frames are `MODEL`/`ENDMDL` blocks; files without `MODEL` records are
/// split every `natom` atom records.
#[derive(Debug, Default)]
pub struct PdbCodec {
    path: PathBuf,
    natom: usize,
    offsets: Vec<u64>,
    periodic_box: Option<PeriodicBox>,
    labels: AtomLabels,
    reader: Option<BufReader<File>>,
    writer: Option<BufWriter<File>>,
    wrote_cryst1: bool,
}

impl PdbCodec {
    fn malformed(&self, reason: impl Into<String>) -> CodecError {
        CodecError::Format {
            format: FORMAT,
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

/// Atom names shorter than four characters start in column 14.
fn padded_name(name: &str) -> String {
    if name.len() >= 4 {
        name.chars().take(4).collect()
    } else {
        format!(" {name:<3}")
    }
}

impl TrajectoryCodec for PdbCodec {
    fn identify(&self, probe: &mut ProbeFile) -> io::Result<bool> {
        let lines = probe.read_lines(2)?;
        Ok(lines.iter().any(|l| is_record_line(l)))
    }

    fn setup_read(&mut self, path: &Path, topology: &Topology) -> Result<usize, CodecError> {
        self.path = path.to_path_buf();
        self.natom = topology.natom();
        self.offsets.clear();
        self.periodic_box = None;

        let mut reader = open_reader(path)?;
        let mut line = String::new();
        let mut offset = 0u64;
        // Atoms seen in the model currently being scanned, if one is open.
        let mut in_model: Option<usize> = None;
        loop {
            let n = next_line(&mut reader, &mut line)?;
            if n == 0 {
                break;
            }
            if is_atom_line(&line) {
                match in_model {
                    Some(count) if count < self.natom => in_model = Some(count + 1),
                    _ => {
                        self.offsets.push(offset);
                        in_model = Some(1);
                    }
                }
            } else if line.starts_with("ENDMDL") || line.trim_end() == "END" {
                if let Some(count) = in_model.take() {
                    if count != self.natom {
                        return Err(CodecError::AtomMismatch {
                            path: self.path.clone(),
                            expected: self.natom,
                            found: count,
                        });
                    }
                }
            } else if line.starts_with("CRYST1") && self.periodic_box.is_none() {
                self.periodic_box = parse_cryst1(&line);
            }
            offset += n as u64;
        }
        if let Some(count) = in_model {
            if count != self.natom {
                return Err(CodecError::AtomMismatch {
                    path: self.path.clone(),
                    expected: self.natom,
                    found: count,
                });
            }
        }
        if self.offsets.is_empty() {
            return Err(self.malformed("no ATOM/HETATM records"));
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

        frame.coords.clear();
        let mut line = String::new();
        let mut failure = None;
        while frame.coords.len() < natom {
            if next_line(reader, &mut line)? == 0 {
                break;
            }
            if !is_atom_line(&line) {
                continue;
            }
            match AtomRecord::parse(&line) {
                Ok(record) => frame.coords.push(record.position),
                Err(reason) => {
                    failure = Some(reason);
                    break;
                }
            }
        }
        if let Some(reason) = failure {
            return Err(self.malformed(format!("frame {}: {reason}", set + 1)));
        }
        if frame.coords.len() != natom {
            return Err(self.malformed(format!(
                "frame {} ended after {} of {natom} atoms",
                set + 1,
                frame.coords.len()
            )));
        }
        frame.periodic_box = self.periodic_box;
        frame.time = None;
        Ok(())
    }

    fn setup_write(&mut self, path: &Path, topology: &Topology) -> Result<(), CodecError> {
        self.path = path.to_path_buf();
        self.natom = topology.natom();
        self.labels = AtomLabels::from_topology(topology);
        self.wrote_cryst1 = false;
        self.writer = Some(create_writer(path)?);
        Ok(())
    }

    fn write_frame(&mut self, set: usize, frame: &Frame) -> Result<(), CodecError> {
        let labels = &self.labels;
        let writer = self.writer.as_mut().ok_or(CodecError::NotOpen)?;
        if let (Some(b), false) = (&frame.periodic_box, self.wrote_cryst1) {
            writeln!(
                writer,
                "CRYST1{:9.3}{:9.3}{:9.3}{:7.2}{:7.2}{:7.2} P 1           1",
                b.lengths.x, b.lengths.y, b.lengths.z, b.angles.x, b.angles.y, b.angles.z
            )?;
            self.wrote_cryst1 = true;
        }
        writeln!(writer, "MODEL     {:>4}", set + 1)?;
        for (i, p) in frame.coords.iter().enumerate() {
            let name = labels.names.get(i).map_or("X", String::as_str);
            let res_name = labels.res_names.get(i).map_or("UNK", String::as_str);
            let res_num = labels.res_numbers.get(i).copied().unwrap_or(0);
            writeln!(
                writer,
                "ATOM  {:>5} {} {:>3.3} A{:>4}    {:8.3}{:8.3}{:8.3}{:6.2}{:6.2}",
                (i + 1) % 100_000,
                padded_name(name),
                res_name,
                res_num % 10_000,
                p.x,
                p.y,
                p.z,
                1.0,
                0.0
            )?;
        }
        writeln!(writer, "ENDMDL")?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), CodecError> {
        self.reader = None;
        if let Some(mut writer) = self.writer.take() {
            writeln!(writer, "END")?;
            writer.flush()?;
        }
        Ok(())
    }

    fn info(&self) -> String {
        format!("'{}' is a PDB file", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{line_topology, write_file};
    use nalgebra::Point3;
    use std::fs;
    use tempfile::tempdir;

    fn atom(serial: usize, x: f64) -> String {
        format!(
            "ATOM  {serial:>5}  CA  ALA A{serial:>4}    {x:8.3}{:8.3}{:8.3}  1.00  0.00           C\n",
            0.0, 0.0
        )
    }

    #[test]
    fn identifies_record_keyword_in_first_lines() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "a.pdb", &format!("REMARK x\n{}", atom(1, 0.0)));
        let mut probe = ProbeFile::open(&path).unwrap();
        assert!(PdbCodec::default().identify(&mut probe).unwrap());

        let path = write_file(dir.path(), "b.txt", "title\n   1.000   2.000\n");
        let mut probe = ProbeFile::open(&path).unwrap();
        assert!(!PdbCodec::default().identify(&mut probe).unwrap());
    }

    #[test]
    fn models_become_frames() {
        let dir = tempdir().unwrap();
        let text = format!(
            "MODEL        1\n{}{}ENDMDL\nMODEL        2\n{}{}ENDMDL\nEND\n",
            atom(1, 1.0),
            atom(2, 2.0),
            atom(1, 3.0),
            atom(2, 4.0)
        );
        let path = write_file(dir.path(), "m.pdb", &text);
        let mut codec = PdbCodec::default();
        assert_eq!(codec.setup_read(&path, &line_topology(2)).unwrap(), 2);
        codec.open_read().unwrap();
        let mut frame = Frame::default();
        codec.read_frame(1, &mut frame).unwrap();
        assert_eq!(frame.coords, vec![Point3::new(3.0, 0.0, 0.0), Point3::new(4.0, 0.0, 0.0)]);
    }

    #[test]
    fn files_without_models_split_every_natom_records() {
        let dir = tempdir().unwrap();
        let text: String = (0..6).map(|i| atom(i % 2 + 1, i as f64)).collect();
        let path = write_file(dir.path(), "flat.pdb", &text);
        let mut codec = PdbCodec::default();
        assert_eq!(codec.setup_read(&path, &line_topology(2)).unwrap(), 3);
        codec.open_read().unwrap();
        let mut frame = Frame::default();
        codec.read_frame(2, &mut frame).unwrap();
        assert_eq!(frame.coords[0].x, 4.0);
    }

    #[test]
    fn short_model_is_an_atom_mismatch() {
        let dir = tempdir().unwrap();
        let text = format!("MODEL        1\n{}ENDMDL\n", atom(1, 0.0));
        let path = write_file(dir.path(), "s.pdb", &text);
        let err = PdbCodec::default()
            .setup_read(&path, &line_topology(2))
            .unwrap_err();
        assert!(matches!(err, CodecError::AtomMismatch { found: 1, .. }));
    }

    #[test]
    fn writes_numbered_models_and_trailing_end() {
        let dir = tempdir().unwrap();
        let topology = line_topology(2);
        let path = dir.path().join("out.pdb");
        let mut codec = PdbCodec::default();
        codec.setup_write(&path, &topology).unwrap();
        let mut frame = Frame::new(2);
        frame.periodic_box = Some(PeriodicBox::orthorhombic(10.0, 10.0, 10.0));
        codec.write_frame(4, &frame).unwrap();
        codec.write_frame(5, &frame).unwrap();
        codec.close().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("CRYST1").count(), 1);
        assert!(text.contains("MODEL        5\n"));
        assert!(text.contains("MODEL        6\n"));
        assert!(text.trim_end().ends_with("END"));

        let mut reader = PdbCodec::default();
        assert_eq!(reader.setup_read(&path, &topology).unwrap(), 2);
        reader.open_read().unwrap();
        let mut read = Frame::default();
        reader.read_frame(0, &mut read).unwrap();
        assert_eq!(read.coords, frame.coords);
        assert_eq!(read.periodic_box.unwrap().lengths.x, 10.0);
    }
}
