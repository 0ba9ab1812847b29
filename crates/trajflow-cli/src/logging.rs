use crate::error::{CliError, Result};
use std::fs::File;
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{self, format::Format};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

/// Script directives like `parminfo` and `formats` report at info, so that is the floor
/// unless `-q` is given.
fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbosity) {
        (true, _) => LevelFilter::WARN,
        (false, 0) => LevelFilter::INFO,
        (false, 1) => LevelFilter::DEBUG,
        (false, _) => LevelFilter::TRACE,
    }
}

/// Plain-text layer tagging every line with the emitting thread, so that rank threads
/// (`rank-0`, `rank-1`, ...) can be told apart in a shared log.
fn rank_file_layer<S>(file: File) -> fmt::Layer<S, fmt::format::DefaultFields, Format, File>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<()> {
    let file = log_file.map(File::create).transpose().map_err(CliError::Io)?;

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact();

    tracing_subscriber::registry()
        .with(level_filter(verbosity, quiet))
        .with(console)
        .with(file.map(rank_file_layer))
        .init();
    Ok(())
}
