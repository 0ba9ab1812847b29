use super::{create_writer, next_line, open_reader};
use crate::core::io::traits::{
    CodecError, ProbeFile, TrajectoryCodec, fixed_width_values, is_fixed_width_line,
};
use crate::core::models::frame::{Frame, PeriodicBox};
use crate::core::models::topology::Topology;
use nalgebra::{Point3, Vector3};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const FORMAT: &str = "Amber trajectory";
const FIELD: usize = 8;
const PER_LINE: usize = 10;
const BOX_CHARS: usize = 3 * FIELD;

/// Amber ASCII trajectory (`.crd`/`.mdcrd`): a title line followed by frames of `10F8.3`
/// coordinate lines, each frame optionally followed by a three-value box line.
#[derive(Debug, Default)]
pub struct AmberTrajCodec {
    path: PathBuf,
    natom: usize,
    title_bytes: u64,
    frame_bytes: u64,
    nframes: usize,
    has_box: bool,
    box_angles: Option<Vector3<f64>>,
    reader: Option<BufReader<File>>,
    writer: Option<BufWriter<File>>,
}

impl AmberTrajCodec {
    fn malformed(&self, reason: impl Into<String>) -> CodecError {
        CodecError::Format {
            format: FORMAT,
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

impl TrajectoryCodec for AmberTrajCodec {
    fn identify(&self, probe: &mut ProbeFile) -> io::Result<bool> {
        let lines = probe.read_lines(3)?;
        let Some(second) = lines.get(1) else {
            return Ok(false);
        };
        Ok(is_fixed_width_line(second, FIELD, 3))
    }

    fn setup_read(&mut self, path: &Path, topology: &Topology) -> Result<usize, CodecError> {
        self.path = path.to_path_buf();
        self.natom = topology.natom();
        self.box_angles = topology.periodic_box.map(|b| b.angles);
        if self.natom == 0 {
            return Err(self.malformed("topology has no atoms"));
        }

        let mut reader = open_reader(path)?;
        let mut line = String::new();
        let title_bytes = next_line(&mut reader, &mut line)?;
        if title_bytes == 0 {
            return Err(self.malformed("file is empty"));
        }
        let newline = (title_bytes - line.len()).max(1);

        let values = 3 * self.natom;
        let coord_lines = values.div_ceil(PER_LINE);
        for i in 0..coord_lines {
            let expected = if i + 1 == coord_lines {
                (values - PER_LINE * i) * FIELD
            } else {
                PER_LINE * FIELD
            };
            if next_line(&mut reader, &mut line)? == 0 {
                return Err(self.malformed("first frame is truncated"));
            }
            if line.trim_end().len() != expected {
                return Err(self.malformed(format!(
                    "coordinate line {} has {} characters, expected {expected} for {} atoms",
                    i + 2,
                    line.trim_end().len(),
                    self.natom
                )));
            }
        }
        let coord_bytes = (values * FIELD + coord_lines * newline) as u64;
        let size = fs::metadata(path)?.len();
        let data = size - title_bytes as u64;

        let next_is_box_sized = next_line(&mut reader, &mut line)? > 0
            && line.trim_end().len() == BOX_CHARS
            && is_fixed_width_line(&line, FIELD, 3);
        self.has_box = if self.natom == 1 {
            // A one-atom frame line looks exactly like a box line.
            next_is_box_sized && data % (coord_bytes + (BOX_CHARS + newline) as u64) == 0
        } else {
            next_is_box_sized
        };

        self.title_bytes = title_bytes as u64;
        self.frame_bytes = coord_bytes
            + if self.has_box {
                (BOX_CHARS + newline) as u64
            } else {
                0
            };
        if data % self.frame_bytes != 0 {
            warn!(
                path = %path.display(),
                frame_bytes = self.frame_bytes,
                "File size is not a whole number of frames; trailing data ignored."
            );
        }
        self.nframes = (data / self.frame_bytes) as usize;
        if self.nframes == 0 {
            return Err(self.malformed("no complete frames"));
        }
        Ok(self.nframes)
    }

    fn open_read(&mut self) -> Result<(), CodecError> {
        self.reader = Some(open_reader(&self.path)?);
        Ok(())
    }

    fn read_frame(&mut self, set: usize, frame: &mut Frame) -> Result<(), CodecError> {
        if set >= self.nframes {
            return Err(CodecError::FrameOutOfRange {
                set,
                count: self.nframes,
            });
        }
        let offset = self.title_bytes + set as u64 * self.frame_bytes;
        let reader = self.reader.as_mut().ok_or(CodecError::NotOpen)?;
        reader.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; self.frame_bytes as usize];
        reader.read_exact(&mut buf)?;

        let text = String::from_utf8_lossy(&buf);
        let mut values = Vec::with_capacity(3 * self.natom + 3);
        for line in text.lines() {
            let parsed = fixed_width_values(line, FIELD)
                .map_err(|reason| self.malformed(format!("frame {}: {reason}", set + 1)))?;
            values.extend(parsed);
        }
        let expected = 3 * self.natom + if self.has_box { 3 } else { 0 };
        if values.len() != expected {
            return Err(self.malformed(format!(
                "frame {} has {} values, expected {expected}",
                set + 1,
                values.len()
            )));
        }

        frame.coords.clear();
        frame
            .coords
            .extend(values[..3 * self.natom].chunks_exact(3).map(|c| Point3::new(c[0], c[1], c[2])));
        frame.periodic_box = self.has_box.then(|| {
            let l = &values[3 * self.natom..];
            PeriodicBox {
                lengths: Vector3::new(l[0], l[1], l[2]),
                angles: self.box_angles.unwrap_or_else(|| Vector3::new(90.0, 90.0, 90.0)),
            }
        });
        frame.time = None;
        Ok(())
    }

    fn setup_write(&mut self, path: &Path, topology: &Topology) -> Result<(), CodecError> {
        self.path = path.to_path_buf();
        self.natom = topology.natom();
        let mut writer = create_writer(path)?;
        writeln!(writer, "trajflow trajectory")?;
        self.writer = Some(writer);
        Ok(())
    }

    fn write_frame(&mut self, _set: usize, frame: &Frame) -> Result<(), CodecError> {
        let writer = self.writer.as_mut().ok_or(CodecError::NotOpen)?;
        let mut column = 0;
        for p in &frame.coords {
            for v in [p.x, p.y, p.z] {
                write!(writer, "{v:8.3}")?;
                column += 1;
                if column == PER_LINE {
                    writeln!(writer)?;
                    column = 0;
                }
            }
        }
        if column != 0 {
            writeln!(writer)?;
        }
        if let Some(b) = &frame.periodic_box {
            writeln!(
                writer,
                "{:8.3}{:8.3}{:8.3}",
                b.lengths.x, b.lengths.y, b.lengths.z
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
        format!(
            "'{}' is an Amber trajectory{}",
            self.path.display(),
            if self.has_box { " with box" } else { "" }
        )
    }
}
