use super::defaults::DefaultsConfig;
use super::file::FileConfig;
use super::models::AppConfig;
use crate::cli::Cli;
use crate::error::{CliError, Result};
use crate::utils::parser;
use std::str::FromStr;
use trajflow::engine::config::RunConfigBuilder;
use trajflow::workflows::process::ScriptInput;

/// Merges built-in defaults, the config file, `--set` overrides and flags, in rising priority.
pub fn build_config(args: &Cli) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = match &args.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let run_file = file_config.run.take().unwrap_or_default();
    let input_file = file_config.input.take().unwrap_or_default();
    let output_file = file_config.output.take().unwrap_or_default();

    let ranks = args.ranks.or(run_file.ranks).unwrap_or(defaults.ranks);
    if ranks == 0 {
        return Err(CliError::Argument("the number of ranks must be at least 1".to_string()));
    }
    let progress = !args.no_progress && run_file.progress.unwrap_or(defaults.progress);
    let debug = args.debug.or(run_file.debug).unwrap_or(defaults.debug);
    let max_line_length = args
        .max_line_length
        .or(input_file.max_line_length)
        .unwrap_or(defaults.max_line_length);
    let data_precision = args
        .precision
        .or(output_file.data_precision)
        .unwrap_or(defaults.data_precision);

    let core_config = RunConfigBuilder::new()
        .ranks(ranks)
        .progress(progress)
        .debug(debug)
        .max_line_length(max_line_length)
        .data_precision(data_precision)
        .topologies(args.topologies())
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let script = match args.script_path() {
        Some(path) => ScriptInput::File(path.clone()),
        None => ScriptInput::Stdin,
    };

    Ok(AppConfig { script, core_config })
}

fn parse_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid {kind} value for {key}: {value}")))
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for pair in set_values {
        let (key, value) =
            parser::parse_key_value(pair).map_err(|e| CliError::Config(e.to_string()))?;
        match key {
            "run.ranks" => {
                config.run.get_or_insert_with(Default::default).ranks =
                    Some(parse_value(key, value, "integer")?);
            }
            "run.progress" => {
                config.run.get_or_insert_with(Default::default).progress =
                    Some(parse_value(key, value, "boolean")?);
            }
            "run.debug" => {
                config.run.get_or_insert_with(Default::default).debug =
                    Some(parse_value(key, value, "integer")?);
            }
            "input.max-line-length" => {
                config.input.get_or_insert_with(Default::default).max_line_length =
                    Some(parse_value(key, value, "integer")?);
            }
            "output.data-precision" => {
                config.output.get_or_insert_with(Default::default).data_precision =
                    Some(parse_value(key, value, "integer")?);
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{key}'"
                )));
            }
        }
    }
    Ok(config)
}
