mod builder;
mod defaults;
mod file;
mod models;

pub use builder::build_config;
pub use models::AppConfig;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::error::CliError;
    use clap::Parser;
    use once_cell::sync::Lazy;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};
    use trajflow::workflows::process::ScriptInput;

    static TEST_DIR: Lazy<TempDir> = Lazy::new(|| tempdir().expect("Failed to create temp dir"));

    fn write_config(name: &str, content: &str) -> PathBuf {
        let path = TEST_DIR.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("trajflow").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_apply_without_a_config_file() {
        let config = build_config(&parse(&["sys.pdb"])).unwrap();
        let core = config.core_config;
        assert_eq!(core.ranks, 1);
        assert!(core.progress);
        assert_eq!(core.debug, 0);
        assert_eq!(core.max_line_length, 1024);
        assert_eq!(core.data_precision, 3);
        assert_eq!(core.topologies, vec![PathBuf::from("sys.pdb")]);
        assert_eq!(config.script, ScriptInput::Stdin);
    }

    #[test]
    fn file_values_override_defaults() {
        let path = write_config(
            "file.toml",
            "[run]\nranks = 3\nprogress = false\n\n[input]\nmax-line-length = 4096\n\n[output]\ndata-precision = 6\n",
        );
        let config = build_config(&parse(&["-c", path.to_str().unwrap(), "-i", "run.in"])).unwrap();
        let core = config.core_config;
        assert_eq!(core.ranks, 3);
        assert!(!core.progress);
        assert_eq!(core.max_line_length, 4096);
        assert_eq!(core.data_precision, 6);
        assert_eq!(config.script, ScriptInput::File(PathBuf::from("run.in")));
    }

    #[test]
    fn set_values_override_the_file_and_flags_override_both() {
        let path = write_config("layered.toml", "[run]\nranks = 3\ndebug = 1\n");
        let args = parse(&[
            "-c",
            path.to_str().unwrap(),
            "-S",
            "run.ranks=5",
            "-S",
            "run.debug=2",
            "-d",
            "4",
        ]);
        let core = build_config(&args).unwrap().core_config;
        assert_eq!(core.ranks, 5);
        assert_eq!(core.debug, 4);
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let path = write_config("unknown.toml", "[run]\nthreads = 3\n");
        let err = build_config(&parse(&["-c", path.to_str().unwrap()])).unwrap_err();
        assert!(matches!(err, CliError::FileParsing { .. }));
    }

    #[test]
    fn unsupported_or_malformed_set_values_are_rejected() {
        assert!(matches!(
            build_config(&parse(&["-S", "run.threads=3"])),
            Err(CliError::Config(_))
        ));
        assert!(matches!(
            build_config(&parse(&["-S", "run.ranks=many"])),
            Err(CliError::Config(_))
        ));
        assert!(matches!(
            build_config(&parse(&["-S", "run.ranks"])),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn invalid_core_values_surface_as_config_errors() {
        assert!(matches!(
            build_config(&parse(&["--precision", "40"])),
            Err(CliError::Config(_))
        ));
        assert!(matches!(
            build_config(&parse(&["-n", "0"])),
            Err(CliError::Argument(_))
        ));
    }

    #[test]
    fn no_progress_flag_wins_over_the_file() {
        let path = write_config("progress.toml", "[run]\nprogress = true\n");
        let core = build_config(&parse(&["-c", path.to_str().unwrap(), "--no-progress"]))
            .unwrap()
            .core_config;
        assert!(!core.progress);
    }
}
