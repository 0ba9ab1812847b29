use super::{create_writer, open_reader};
use crate::core::io::traits::{CodecError, ProbeFile, TrajectoryCodec};
use crate::core::models::frame::{Frame, PeriodicBox};
use crate::core::models::topology::Topology;
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use nalgebra::{Point3, Vector3};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const FORMAT: &str = "CHARMM DCD";
const HEADER_MARKER: u32 = 84;
const SIGNATURE: &[u8; 4] = b"CORD";
const TITLE_LEN: usize = 80;
const CELL_BYTES: u64 = 6 * 8;
// Positions in the 20-integer control block following the signature.
const ICNTRL_NSET: usize = 0;
const ICNTRL_NSAVC: usize = 2;
const ICNTRL_HAS_CELL: usize = 10;
const ICNTRL_VERSION: usize = 19;
const CHARMM_VERSION: i32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Endian {
    #[default]
    Little,
    Big,
}

impl Endian {
    fn detect(header: &[u8]) -> Option<Self> {
        let bytes: [u8; 4] = header.get(..4)?.try_into().ok()?;
        if LittleEndian::read_u32(&bytes) == HEADER_MARKER {
            Some(Endian::Little)
        } else if BigEndian::read_u32(&bytes) == HEADER_MARKER {
            Some(Endian::Big)
        } else {
            None
        }
    }

    fn read_i32(self, r: &mut impl Read) -> io::Result<i32> {
        match self {
            Endian::Little => r.read_i32::<LittleEndian>(),
            Endian::Big => r.read_i32::<BigEndian>(),
        }
    }

    fn read_f32_into(self, r: &mut impl Read, dst: &mut [f32]) -> io::Result<()> {
        match self {
            Endian::Little => r.read_f32_into::<LittleEndian>(dst),
            Endian::Big => r.read_f32_into::<BigEndian>(dst),
        }
    }

    fn read_f64_into(self, r: &mut impl Read, dst: &mut [f64]) -> io::Result<()> {
        match self {
            Endian::Little => r.read_f64_into::<LittleEndian>(dst),
            Endian::Big => r.read_f64_into::<BigEndian>(dst),
        }
    }
}

/// CHARMM/NAMD binary DCD. Fortran unformatted records: a header with the `CORD`
/// signature, a title block, the atom count, then per frame an optional unit cell record
/// and one record each for X, Y and Z in single precision.
#[derive(Debug, Default)]
pub struct DcdCodec {
    path: PathBuf,
    natom: usize,
    endian: Endian,
    has_cell: bool,
    header_bytes: u64,
    frame_bytes: u64,
    nframes: usize,
    frames_written: i32,
    xyz: Vec<f32>,
    reader: Option<BufReader<File>>,
    writer: Option<BufWriter<File>>,
}

impl DcdCodec {
    fn malformed(&self, reason: impl Into<String>) -> CodecError {
        CodecError::Format {
            format: FORMAT,
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    /// Reads a record-length marker and checks it against `expected` when given.
    fn marker(&self, r: &mut impl Read, expected: Option<i32>) -> Result<i32, CodecError> {
        let value = self.endian.read_i32(r)?;
        match expected {
            Some(e) if e != value => Err(self.malformed(format!(
                "record marker {value} where {e} was expected"
            ))),
            _ => Ok(value),
        }
    }

    fn parse_header(&mut self, r: &mut impl Read) -> Result<(), CodecError> {
        self.marker(r, Some(HEADER_MARKER as i32))?;
        let mut signature = [0u8; 4];
        r.read_exact(&mut signature)?;
        if &signature != SIGNATURE {
            return Err(self.malformed("missing CORD signature"));
        }
        let mut icntrl = [0i32; 20];
        for value in &mut icntrl {
            *value = self.endian.read_i32(r)?;
        }
        self.marker(r, Some(HEADER_MARKER as i32))?;
        self.has_cell = icntrl[ICNTRL_HAS_CELL] != 0;

        let title_record = self.marker(r, None)?;
        let ntitle = self.endian.read_i32(r)?;
        if ntitle < 0 || i64::from(title_record) != 4 + i64::from(ntitle) * TITLE_LEN as i64 {
            return Err(self.malformed(format!("title record of {title_record} bytes")));
        }
        let mut titles = vec![0u8; ntitle as usize * TITLE_LEN];
        r.read_exact(&mut titles)?;
        self.marker(r, Some(title_record))?;

        self.marker(r, Some(4))?;
        let natom = self.endian.read_i32(r)?;
        self.marker(r, Some(4))?;
        if natom < 0 || natom as usize != self.natom {
            return Err(CodecError::AtomMismatch {
                path: self.path.clone(),
                expected: self.natom,
                found: natom.max(0) as usize,
            });
        }

        self.header_bytes = (4 + 4 + 80 + 4) + (4 + title_record as u64 + 4) + (4 + 4 + 4);
        let axis = 4 * self.natom as u64 + 8;
        self.frame_bytes = 3 * axis + if self.has_cell { CELL_BYTES + 8 } else { 0 };
        Ok(())
    }
}

impl TrajectoryCodec for DcdCodec {
    fn identify(&self, probe: &mut ProbeFile) -> io::Result<bool> {
        let header = probe.read_header(8)?;
        Ok(header.len() == 8 && Endian::detect(&header).is_some() && &header[4..8] == SIGNATURE)
    }

    fn setup_read(&mut self, path: &Path, topology: &Topology) -> Result<usize, CodecError> {
        self.path = path.to_path_buf();
        self.natom = topology.natom();
        let mut reader = open_reader(path)?;
        let mut first = [0u8; 4];
        reader.read_exact(&mut first)?;
        self.endian = Endian::detect(&first).ok_or_else(|| self.malformed("not a DCD file"))?;
        reader.seek(SeekFrom::Start(0))?;
        self.parse_header(&mut reader)?;

        let data = fs::metadata(path)?.len().saturating_sub(self.header_bytes);
        if data % self.frame_bytes != 0 {
            warn!(path = %path.display(), "DCD ends with a partial frame; it will be ignored.");
        }
        self.nframes = (data / self.frame_bytes) as usize;
        Ok(self.nframes)
    }

    fn open_read(&mut self) -> Result<(), CodecError> {
        self.reader = Some(open_reader(&self.path)?);
        self.xyz = vec![0.0; self.natom];
        Ok(())
    }

    fn read_frame(&mut self, set: usize, frame: &mut Frame) -> Result<(), CodecError> {
        if set >= self.nframes {
            return Err(CodecError::FrameOutOfRange {
                set,
                count: self.nframes,
            });
        }
        let mut reader = self.reader.take().ok_or(CodecError::NotOpen)?;
        let result = self.read_frame_from(&mut reader, set, frame);
        self.reader = Some(reader);
        result
    }

    fn setup_write(&mut self, path: &Path, topology: &Topology) -> Result<(), CodecError> {
        self.path = path.to_path_buf();
        self.natom = topology.natom();
        self.endian = Endian::Little;
        self.has_cell = topology.periodic_box.is_some();
        self.frames_written = 0;

        let mut w = create_writer(path)?;
        w.write_i32::<LittleEndian>(HEADER_MARKER as i32)?;
        w.write_all(SIGNATURE)?;
        let mut icntrl = [0i32; 20];
        icntrl[ICNTRL_NSAVC] = 1;
        icntrl[ICNTRL_HAS_CELL] = i32::from(self.has_cell);
        icntrl[ICNTRL_VERSION] = CHARMM_VERSION;
        for value in icntrl {
            w.write_i32::<LittleEndian>(value)?;
        }
        w.write_i32::<LittleEndian>(HEADER_MARKER as i32)?;

        let mut title = format!("Created by trajflow from {}", topology.name()).into_bytes();
        title.resize(TITLE_LEN, b' ');
        w.write_i32::<LittleEndian>(4 + TITLE_LEN as i32)?;
        w.write_i32::<LittleEndian>(1)?;
        w.write_all(&title)?;
        w.write_i32::<LittleEndian>(4 + TITLE_LEN as i32)?;

        w.write_i32::<LittleEndian>(4)?;
        w.write_i32::<LittleEndian>(self.natom as i32)?;
        w.write_i32::<LittleEndian>(4)?;
        self.writer = Some(w);
        Ok(())
    }

    fn write_frame(&mut self, _set: usize, frame: &Frame) -> Result<(), CodecError> {
        let has_cell = self.has_cell;
        let w = self.writer.as_mut().ok_or(CodecError::NotOpen)?;
        if has_cell {
            let (l, a) = frame
                .periodic_box
                .map(|b| (b.lengths, b.angles))
                .unwrap_or_else(|| (Vector3::zeros(), Vector3::new(90.0, 90.0, 90.0)));
            w.write_i32::<LittleEndian>(CELL_BYTES as i32)?;
            // CHARMM order: a, gamma, b, beta, alpha, c
            for v in [l.x, a.z, l.y, a.y, a.x, l.z] {
                w.write_f64::<LittleEndian>(v)?;
            }
            w.write_i32::<LittleEndian>(CELL_BYTES as i32)?;
        }
        let record = 4 * frame.natom() as i32;
        for axis in 0..3 {
            w.write_i32::<LittleEndian>(record)?;
            for p in &frame.coords {
                w.write_f32::<LittleEndian>(p[axis] as f32)?;
            }
            w.write_i32::<LittleEndian>(record)?;
        }
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), CodecError> {
        self.reader = None;
        if let Some(mut w) = self.writer.take() {
            // Patch NSET now that the frame count is known.
            w.seek(SeekFrom::Start(8 + 4 * ICNTRL_NSET as u64))?;
            w.write_i32::<LittleEndian>(self.frames_written)?;
            w.flush()?;
        }
        Ok(())
    }

    fn info(&self) -> String {
        format!(
            "'{}' is a {}-endian CHARMM DCD{}",
            self.path.display(),
            match self.endian {
                Endian::Little => "little",
                Endian::Big => "big",
            },
            if self.has_cell { " with unit cell" } else { "" }
        )
    }
}

impl DcdCodec {
    fn read_frame_from(
        &mut self,
        r: &mut BufReader<File>,
        set: usize,
        frame: &mut Frame,
    ) -> Result<(), CodecError> {
        r.seek(SeekFrom::Start(self.header_bytes + set as u64 * self.frame_bytes))?;
        frame.periodic_box = None;
        if self.has_cell {
            self.marker(r, Some(CELL_BYTES as i32))?;
            let mut cell = [0f64; 6];
            self.endian.read_f64_into(r, &mut cell)?;
            self.marker(r, Some(CELL_BYTES as i32))?;
            let [a, gamma, b, beta, alpha, c] = cell;
            frame.periodic_box = Some(PeriodicBox {
                lengths: Vector3::new(a, b, c),
                angles: Vector3::new(alpha, beta, gamma),
            });
        }
        frame.coords.resize(self.natom, Point3::origin());
        let record = 4 * self.natom as i32;
        for axis in 0..3 {
            self.marker(r, Some(record))?;
            self.endian.read_f32_into(r, &mut self.xyz)?;
            self.marker(r, Some(record))?;
            for (p, v) in frame.coords.iter_mut().zip(&self.xyz) {
                p[axis] = f64::from(*v);
            }
        }
        frame.time = None;
        Ok(())
    }
}
