use super::{create_writer, next_line, open_reader};
use crate::core::io::traits::{
    CodecError, ProbeFile, TrajectoryCodec, fixed_width_values, is_fixed_width_line,
};
use crate::core::models::frame::{Frame, PeriodicBox};
use crate::core::models::topology::Topology;
use nalgebra::{Point3, Vector3};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const FORMAT: &str = "Amber restart";
const FIELD: usize = 12;
const PER_LINE: usize = 6;

/// Amber ASCII restart (`.rst7`): one frame with an atom-count/time line, `6F12.7`
/// coordinates, optional velocities and an optional box line.
///
/// Writing produces one file per frame, named `<path>.<frame>` with 1-based frame numbers.
#[derive(Debug, Default)]
pub struct AmberRestartCodec {
    path: PathBuf,
    natom: usize,
    time: Option<f64>,
    coords: Vec<Point3<f64>>,
    periodic_box: Option<PeriodicBox>,
    has_velocities: bool,
    title: String,
}

impl AmberRestartCodec {
    fn malformed(&self, reason: impl Into<String>) -> CodecError {
        CodecError::Format {
            format: FORMAT,
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    /// Parses `natom [time]`.
    fn parse_count_line(line: &str) -> Option<(usize, Option<f64>)> {
        let mut tokens = line.split_whitespace();
        let natom = tokens.next()?.parse().ok()?;
        let time = tokens.next().and_then(|t| t.parse().ok());
        Some((natom, time))
    }
}

impl TrajectoryCodec for AmberRestartCodec {
    fn identify(&self, probe: &mut ProbeFile) -> io::Result<bool> {
        let lines = probe.read_lines(3)?;
        if lines.len() < 3 || Self::parse_count_line(&lines[1]).is_none() {
            return Ok(false);
        }
        Ok(is_fixed_width_line(&lines[2], FIELD, 7))
    }

    fn setup_read(&mut self, path: &Path, topology: &Topology) -> Result<usize, CodecError> {
        self.path = path.to_path_buf();
        let mut reader = open_reader(path)?;
        let mut line = String::new();
        next_line(&mut reader, &mut line)?;
        self.title = line.trim_end().to_string();

        if next_line(&mut reader, &mut line)? == 0 {
            return Err(self.malformed("missing atom count line"));
        }
        let (natom, time) = Self::parse_count_line(&line)
            .ok_or_else(|| self.malformed(format!("invalid atom count line '{line}'")))?;
        if natom != topology.natom() {
            return Err(CodecError::AtomMismatch {
                path: self.path.clone(),
                expected: topology.natom(),
                found: natom,
            });
        }
        self.natom = natom;
        self.time = time;

        let mut rows = Vec::new();
        let mut line_no = 2;
        while next_line(&mut reader, &mut line)? > 0 {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let parsed = fixed_width_values(&line, FIELD)
                .map_err(|reason| self.malformed(format!("line {line_no}: {reason}")))?;
            rows.push(parsed);
        }

        let n = 3 * natom;
        let coord_lines = n.div_ceil(PER_LINE);
        if rows.len() < coord_lines {
            return Err(self.malformed(format!(
                "found {} coordinate lines, expected {coord_lines}",
                rows.len()
            )));
        }
        // Velocities repeat the coordinate layout; a box is one extra line. With a single
        // coordinate line the two are indistinguishable and the line is taken as a box.
        let extra = rows.len() - coord_lines;
        let (has_velocities, box_row) = match extra {
            0 => (false, None),
            1 => (false, rows.last()),
            e if e == coord_lines => (true, None),
            e if e == coord_lines + 1 => (true, rows.last()),
            e => {
                return Err(self.malformed(format!(
                    "{e} lines follow the coordinates; expected velocities and/or a box"
                )));
            }
        };
        let coords: Vec<f64> = rows[..coord_lines].iter().flatten().copied().collect();
        if coords.len() != n {
            return Err(self.malformed(format!(
                "found {} coordinate values, expected {n}",
                coords.len()
            )));
        }
        self.has_velocities = has_velocities;
        self.periodic_box = match box_row.map(Vec::as_slice) {
            None => None,
            Some([a, b, c]) => Some(PeriodicBox::orthorhombic(*a, *b, *c)),
            Some([a, b, c, alpha, beta, gamma, ..]) => Some(PeriodicBox {
                lengths: Vector3::new(*a, *b, *c),
                angles: Vector3::new(*alpha, *beta, *gamma),
            }),
            Some(other) => {
                return Err(self.malformed(format!("box line has {} values", other.len())));
            }
        };
        self.coords = coords
            .chunks_exact(3)
            .map(|c| Point3::new(c[0], c[1], c[2]))
            .collect();
        debug!(path = %path.display(), natom, velocities = self.has_velocities, "Read restart.");
        Ok(1)
    }

    fn open_read(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn read_frame(&mut self, set: usize, frame: &mut Frame) -> Result<(), CodecError> {
        if set != 0 {
            return Err(CodecError::FrameOutOfRange { set, count: 1 });
        }
        frame.coords.clone_from(&self.coords);
        frame.periodic_box = self.periodic_box;
        frame.time = self.time;
        Ok(())
    }

    fn setup_write(&mut self, path: &Path, topology: &Topology) -> Result<(), CodecError> {
        self.path = path.to_path_buf();
        self.natom = topology.natom();
        self.title = format!("trajflow restart for {}", topology.name());
        Ok(())
    }

    fn write_frame(&mut self, set: usize, frame: &Frame) -> Result<(), CodecError> {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{}", set + 1));
        let mut writer = create_writer(Path::new(&name))?;

        writeln!(writer, "{}", self.title)?;
        match frame.time {
            Some(t) => writeln!(writer, "{:5}{:15.7}", frame.natom(), t)?,
            None => writeln!(writer, "{:5}", frame.natom())?,
        }
        let values: Vec<f64> = frame.coords.iter().flat_map(|p| [p.x, p.y, p.z]).collect();
        for chunk in values.chunks(PER_LINE) {
            for v in chunk {
                write!(writer, "{v:12.7}")?;
            }
            writeln!(writer)?;
        }
        if let Some(b) = &frame.periodic_box {
            writeln!(
                writer,
                "{:12.7}{:12.7}{:12.7}{:12.7}{:12.7}{:12.7}",
                b.lengths.x, b.lengths.y, b.lengths.z, b.angles.x, b.angles.y, b.angles.z
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn info(&self) -> String {
        format!(
            "'{}' is an Amber restart{}{}",
            self.path.display(),
            if self.has_velocities { " with velocities" } else { "" },
            if self.periodic_box.is_some() { " with box" } else { "" }
        )
    }
}
