use super::formats::{amber_restart, amber_traj, dcd, gro, mol2, pdb};
use super::traits::{ProbeFile, TrajectoryCodec};
use phf::phf_ordered_map;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

/// Every trajectory format the registry knows about, in detection priority order.
///
/// More specific signatures come first: the restart format is probed before the plain
/// Amber trajectory, whose header check is the loosest of all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrajFormat {
    AmberNetcdf,
    AmberRestartNc,
    AmberNcEnsemble,
    Pdb,
    Mol2,
    Cif,
    CharmmDcd,
    GromacsTrx,
    GromacsXtc,
    Binpos,
    AmberRestart,
    Gro,
    Tinker,
    CharmmCor,
    AmberTraj,
    Sqm,
    Sdf,
    Conflib,
    Unknown,
}

pub type CodecFactory = fn() -> Box<dyn TrajectoryCodec>;

/// Static description of one format. Formats without a factory are known by name only.
#[derive(Debug, Clone, Copy)]
pub struct FormatDescriptor {
    pub format: TrajFormat,
    pub name: &'static str,
    pub read_help: Option<&'static str>,
    pub write_help: Option<&'static str>,
    pub factory: Option<CodecFactory>,
}

impl FormatDescriptor {
    const fn known(format: TrajFormat, name: &'static str) -> Self {
        Self {
            format,
            name,
            read_help: None,
            write_help: None,
            factory: None,
        }
    }
}

fn new_pdb() -> Box<dyn TrajectoryCodec> {
    Box::new(pdb::PdbCodec::default())
}
fn new_mol2() -> Box<dyn TrajectoryCodec> {
    Box::new(mol2::Mol2Codec::default())
}
fn new_dcd() -> Box<dyn TrajectoryCodec> {
    Box::new(dcd::DcdCodec::default())
}
fn new_amber_restart() -> Box<dyn TrajectoryCodec> {
    Box::new(amber_restart::AmberRestartCodec::default())
}
fn new_gro() -> Box<dyn TrajectoryCodec> {
    Box::new(gro::GroCodec::default())
}
fn new_amber_traj() -> Box<dyn TrajectoryCodec> {
    Box::new(amber_traj::AmberTrajCodec::default())
}

/// The format table. Position in this slice is probe order.
pub static FORMATS: &[FormatDescriptor] = &[
    FormatDescriptor::known(TrajFormat::AmberNetcdf, "Amber NetCDF"),
    FormatDescriptor::known(TrajFormat::AmberRestartNc, "Amber NC Restart"),
    FormatDescriptor::known(TrajFormat::AmberNcEnsemble, "Amber NC Ensemble"),
    FormatDescriptor {
        format: TrajFormat::Pdb,
        name: "PDBFILE",
        read_help: None,
        write_help: Some("\tWrites one MODEL block per frame; CRYST1 when the frame has a box."),
        factory: Some(new_pdb),
    },
    FormatDescriptor {
        format: TrajFormat::Mol2,
        name: "Mol2",
        read_help: None,
        write_help: Some("\tWrites one @<TRIPOS>MOLECULE block per frame."),
        factory: Some(new_mol2),
    },
    FormatDescriptor::known(TrajFormat::Cif, "CIF"),
    FormatDescriptor {
        format: TrajFormat::CharmmDcd,
        name: "Charmm DCD",
        read_help: Some("\tLittle- and big-endian files, with or without unit cell records."),
        write_help: Some("\tWrites little-endian files with a unit cell record when the frame has a box."),
        factory: Some(new_dcd),
    },
    FormatDescriptor::known(TrajFormat::GromacsTrx, "Gromacs TRX"),
    FormatDescriptor::known(TrajFormat::GromacsXtc, "Gromacs XTC"),
    FormatDescriptor::known(TrajFormat::Binpos, "BINPOS"),
    FormatDescriptor {
        format: TrajFormat::AmberRestart,
        name: "Amber Restart",
        read_help: None,
        write_help: Some("\tEach frame is written to <file>.<frame>."),
        factory: Some(new_amber_restart),
    },
    FormatDescriptor {
        format: TrajFormat::Gro,
        name: "GRO file",
        read_help: None,
        write_help: None,
        factory: Some(new_gro),
    },
    FormatDescriptor::known(TrajFormat::Tinker, "Tinker file"),
    FormatDescriptor::known(TrajFormat::CharmmCor, "CHARMM coordinate"),
    FormatDescriptor {
        format: TrajFormat::AmberTraj,
        name: "Amber Trajectory",
        read_help: None,
        write_help: Some("\tnobox: Do not write box coordinates."),
        factory: Some(new_amber_traj),
    },
    FormatDescriptor::known(TrajFormat::Sqm, "SQM Input"),
    FormatDescriptor::known(TrajFormat::Sdf, "SDF"),
    FormatDescriptor::known(TrajFormat::Conflib, "LMOD conflib"),
];

/// Default output extension of a format selected by keyword.
#[derive(Debug, Clone, Copy)]
pub struct FormatKey {
    pub format: TrajFormat,
    pub extension: &'static str,
}

const fn key(format: TrajFormat, extension: &'static str) -> FormatKey {
    FormatKey { format, extension }
}

/// Explicit format keywords. Insertion order decides which format owns a shared extension.
pub static FORMAT_KEYS: phf::OrderedMap<&'static str, FormatKey> = phf_ordered_map! {
    "netcdf" => key(TrajFormat::AmberNetcdf, ".nc"),
    "cdf" => key(TrajFormat::AmberNetcdf, ".nc"),
    "ncrestart" => key(TrajFormat::AmberRestartNc, ".ncrst"),
    "restartnc" => key(TrajFormat::AmberRestartNc, ".ncrst"),
    "pdb" => key(TrajFormat::Pdb, ".pdb"),
    "mol2" => key(TrajFormat::Mol2, ".mol2"),
    "cif" => key(TrajFormat::Cif, ".cif"),
    "dcd" => key(TrajFormat::CharmmDcd, ".dcd"),
    "charmm" => key(TrajFormat::CharmmDcd, ".dcd"),
    "trr" => key(TrajFormat::GromacsTrx, ".trr"),
    "xtc" => key(TrajFormat::GromacsXtc, ".xtc"),
    "binpos" => key(TrajFormat::Binpos, ".binpos"),
    "restart" => key(TrajFormat::AmberRestart, ".rst7"),
    "restrt" => key(TrajFormat::AmberRestart, ".rst7"),
    "rest" => key(TrajFormat::AmberRestart, ".rst7"),
    "gro" => key(TrajFormat::Gro, ".gro"),
    "crd" => key(TrajFormat::AmberTraj, ".crd"),
    "conflib" => key(TrajFormat::Conflib, ".conflib"),
    "sqm" => key(TrajFormat::Sqm, ".sqm"),
    "sdf" => key(TrajFormat::Sdf, ".sdf"),
};

impl TrajFormat {
    pub fn descriptor(self) -> Option<&'static FormatDescriptor> {
        FORMATS.iter().find(|d| d.format == self)
    }

    pub fn name(self) -> &'static str {
        self.descriptor().map_or("Unknown trajectory", |d| d.name)
    }

    /// Creates a codec for this format, or `None` when it has no built-in codec.
    pub fn new_codec(self) -> Option<Box<dyn TrajectoryCodec>> {
        self.descriptor().and_then(|d| d.factory).map(|f| f())
    }

    /// Default output extension, including the leading dot.
    pub fn extension(self) -> Option<&'static str> {
        FORMAT_KEYS
            .values()
            .find(|k| k.format == self)
            .map(|k| k.extension)
    }
}

impl fmt::Display for TrajFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Looks up an explicit format keyword such as `pdb` or `restart`. Never touches the disk.
pub fn format_from_keyword(keyword: &str) -> Option<TrajFormat> {
    FORMAT_KEYS.get(keyword).map(|k| k.format)
}

/// Picks a format from the extension of `path`, for naming output files.
pub fn format_from_extension(path: &Path) -> Option<TrajFormat> {
    let ext = path.extension()?.to_str()?;
    FORMAT_KEYS
        .values()
        .find(|k| k.extension[1..].eq_ignore_ascii_case(ext))
        .map(|k| k.format)
}

/// Read and write help for `format`, one entry per available direction.
pub fn help_text(format: TrajFormat) -> Vec<String> {
    let Some(d) = format.descriptor() else {
        return Vec::new();
    };
    let mut help = Vec::new();
    if let Some(text) = d.read_help {
        help.push(format!("Read options for {}:\n{text}", d.name));
    }
    if let Some(text) = d.write_help {
        help.push(format!("Write options for {}:\n{text}", d.name));
    }
    help
}

/// The result of successful detection: the format and the codec instance that claimed it.
pub struct Detected {
    pub format: TrajFormat,
    pub codec: Box<dyn TrajectoryCodec>,
}

impl fmt::Debug for Detected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detected")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Could not open '{path}' for format detection: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Could not determine the trajectory format of '{path}'")]
    Unrecognized { path: PathBuf },
}

/// Identifies the format of `path` by content, probing the built-in codecs in table order.
pub fn detect_format(path: impl AsRef<Path>) -> Result<Detected, DetectError> {
    detect_format_in(path.as_ref(), FORMATS)
}

pub(crate) fn detect_format_in(
    path: &Path,
    table: &[FormatDescriptor],
) -> Result<Detected, DetectError> {
    let mut probe = ProbeFile::open(path).map_err(|source| DetectError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    for descriptor in table {
        let Some(factory) = descriptor.factory else {
            continue;
        };
        let codec = factory();
        match codec.identify(&mut probe) {
            Ok(true) => {
                debug!(path = %path.display(), format = descriptor.name, "Detected trajectory format.");
                return Ok(Detected {
                    format: descriptor.format,
                    codec,
                });
            }
            Ok(false) => {}
            Err(e) => {
                trace!(format = descriptor.name, error = %e, "Format probe failed.");
            }
        }
    }
    Err(DetectError::Unrecognized {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::traits::CodecError;
    use crate::core::models::frame::Frame;
    use crate::core::models::topology::Topology;
    use crate::test_utils::write_file;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    static CREATED: AtomicUsize = AtomicUsize::new(0);

    /// Test codec claiming files whose first byte equals `MARK`.
    struct Marker<const MARK: u8>;

    impl<const MARK: u8> TrajectoryCodec for Marker<MARK> {
        fn identify(&self, probe: &mut ProbeFile) -> io::Result<bool> {
            Ok(probe.read_header(1)?.first() == Some(&MARK))
        }
        fn setup_read(&mut self, _: &Path, _: &Topology) -> Result<usize, CodecError> {
            Ok(0)
        }
        fn open_read(&mut self) -> Result<(), CodecError> {
            Ok(())
        }
        fn read_frame(&mut self, _: usize, _: &mut Frame) -> Result<(), CodecError> {
            Ok(())
        }
        fn setup_write(&mut self, _: &Path, _: &Topology) -> Result<(), CodecError> {
            Ok(())
        }
        fn write_frame(&mut self, _: usize, _: &Frame) -> Result<(), CodecError> {
            Ok(())
        }
        fn close(&mut self) -> Result<(), CodecError> {
            Ok(())
        }
        fn info(&self) -> String {
            format!("marker {}", MARK as char)
        }
    }

    fn counted<const MARK: u8>() -> Box<dyn TrajectoryCodec> {
        CREATED.fetch_add(1, Ordering::SeqCst);
        Box::new(Marker::<MARK>)
    }

    fn table() -> Vec<FormatDescriptor> {
        vec![
            FormatDescriptor::known(TrajFormat::AmberNetcdf, "no factory"),
            FormatDescriptor {
                factory: Some(counted::<b'A'>),
                ..FormatDescriptor::known(TrajFormat::Pdb, "first A")
            },
            FormatDescriptor {
                factory: Some(counted::<b'A'>),
                ..FormatDescriptor::known(TrajFormat::Mol2, "second A")
            },
            FormatDescriptor {
                factory: Some(counted::<b'B'>),
                ..FormatDescriptor::known(TrajFormat::Gro, "B")
            },
        ]
    }

    mod detection {
        use super::*;
        use serial_test::serial;

        #[test]
        #[serial]
        fn first_matching_codec_in_table_order_wins() {
            let dir = tempdir().unwrap();
            let path = write_file(dir.path(), "a.traj", "A...");
            let detected = detect_format_in(&path, &table()).unwrap();
            assert_eq!(detected.format, TrajFormat::Pdb);

            let path = write_file(dir.path(), "b.traj", "B...");
            let detected = detect_format_in(&path, &table()).unwrap();
            assert_eq!(detected.format, TrajFormat::Gro);
            assert_eq!(detected.codec.info(), "marker B");
        }

        #[test]
        #[serial]
        fn unreadable_path_instantiates_no_codec() {
            let dir = tempdir().unwrap();
            CREATED.store(0, Ordering::SeqCst);
            let result = detect_format_in(&dir.path().join("missing.traj"), &table());
            assert!(matches!(result, Err(DetectError::Unreadable { .. })));
            assert_eq!(CREATED.load(Ordering::SeqCst), 0);
        }

        #[test]
        #[serial]
        fn no_match_is_unrecognized_after_probing_every_factory() {
            let dir = tempdir().unwrap();
            let path = write_file(dir.path(), "z.traj", "Z...");
            CREATED.store(0, Ordering::SeqCst);
            let result = detect_format_in(&path, &table());
            assert!(matches!(result, Err(DetectError::Unrecognized { .. })));
            assert_eq!(CREATED.load(Ordering::SeqCst), 3);
        }
    }

    mod built_in {
        use super::*;
        use crate::test_utils::line_topology;
        use nalgebra::Point3;

        /// Writes a single frame and returns the file that holds it. Restart output lands in
        /// `<path>.1`.
        fn write_one_frame(format: TrajFormat, path: &Path) -> PathBuf {
            let topology = line_topology(3);
            let mut frame = Frame::new(3);
            for (i, coord) in frame.coords.iter_mut().enumerate() {
                *coord = Point3::new(i as f64 + 0.25, 1.5, -2.0);
            }
            let mut codec = format.new_codec().unwrap();
            codec.setup_write(path, &topology).unwrap();
            codec.write_frame(0, &frame).unwrap();
            codec.close().unwrap();
            match format {
                TrajFormat::AmberRestart => PathBuf::from(format!("{}.1", path.display())),
                _ => path.to_path_buf(),
            }
        }

        #[test]
        fn codec_output_is_detected_whatever_the_file_is_called() {
            let dir = tempdir().unwrap();
            let cases = [
                (TrajFormat::Pdb, "frames.crd"),
                (TrajFormat::Mol2, "frames.pdb"),
                (TrajFormat::CharmmDcd, "frames.gro"),
                (TrajFormat::AmberRestart, "frames.crd"),
                (TrajFormat::Gro, "frames.mol2"),
                (TrajFormat::AmberTraj, "frames.rst7"),
            ];
            for (i, (format, name)) in cases.into_iter().enumerate() {
                let path = write_one_frame(format, &dir.path().join(format!("{i}-{name}")));
                let detected = detect_format(&path).unwrap();
                assert_eq!(detected.format, format, "{}", path.display());
            }
        }

        #[test]
        fn restart_is_claimed_before_the_plain_amber_trajectory() {
            let dir = tempdir().unwrap();
            let path = write_one_frame(TrajFormat::AmberRestart, &dir.path().join("state.crd"));
            assert!(path.exists());
            assert_eq!(detect_format(&path).unwrap().format, TrajFormat::AmberRestart);
        }
    }

    mod lookup {
        use super::*;

        #[test]
        fn table_is_in_probe_order_and_excludes_unknown() {
            let order: Vec<_> = FORMATS.iter().map(|d| d.format).collect();
            assert_eq!(order.first(), Some(&TrajFormat::AmberNetcdf));
            assert_eq!(order.last(), Some(&TrajFormat::Conflib));
            let pos = |f| order.iter().position(|&x| x == f).unwrap();
            assert!(pos(TrajFormat::AmberRestart) < pos(TrajFormat::AmberTraj));
            assert!(pos(TrajFormat::Pdb) < pos(TrajFormat::CharmmDcd));
            assert!(!order.contains(&TrajFormat::Unknown));
        }

        #[test]
        fn keywords_map_many_to_one() {
            assert_eq!(format_from_keyword("restrt"), Some(TrajFormat::AmberRestart));
            assert_eq!(format_from_keyword("rest"), Some(TrajFormat::AmberRestart));
            assert_eq!(format_from_keyword("charmm"), Some(TrajFormat::CharmmDcd));
            assert_eq!(format_from_keyword("PDB"), None);
            assert_eq!(format_from_keyword("nope"), None);
        }

        #[test]
        fn extension_picks_output_format() {
            assert_eq!(format_from_extension(Path::new("out.dcd")), Some(TrajFormat::CharmmDcd));
            assert_eq!(format_from_extension(Path::new("out.PDB")), Some(TrajFormat::Pdb));
            assert_eq!(format_from_extension(Path::new("out.crd")), Some(TrajFormat::AmberTraj));
            assert_eq!(format_from_extension(Path::new("out")), None);
        }

        #[test]
        fn only_built_formats_create_codecs() {
            assert!(TrajFormat::Pdb.new_codec().is_some());
            assert!(TrajFormat::AmberTraj.new_codec().is_some());
            assert!(TrajFormat::AmberNetcdf.new_codec().is_none());
            assert!(TrajFormat::Unknown.new_codec().is_none());
        }

        #[test]
        fn help_text_lists_available_directions() {
            let help = help_text(TrajFormat::CharmmDcd);
            assert_eq!(help.len(), 2);
            assert!(help[0].starts_with("Read options for Charmm DCD"));
            assert!(help_text(TrajFormat::Gro).is_empty());
            assert_eq!(TrajFormat::Unknown.to_string(), "Unknown trajectory");
            assert_eq!(TrajFormat::AmberTraj.extension(), Some(".crd"));
        }
    }
}
