use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;
pub const DEFAULT_DATA_PRECISION: usize = 3;
const MAX_DATA_PRECISION: usize = 17;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

/// Settings shared by every rank of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Number of in-process ranks; validated by the rank runtime, not here.
    pub ranks: usize,
    pub progress: bool,
    pub debug: u32,
    pub max_line_length: usize,
    /// Decimal places used for data file values.
    pub data_precision: usize,
    /// Topologies loaded before the script is read, in order.
    pub topologies: Vec<PathBuf>,
}

#[derive(Default)]
pub struct RunConfigBuilder {
    ranks: Option<usize>,
    progress: Option<bool>,
    debug: Option<u32>,
    max_line_length: Option<usize>,
    data_precision: Option<usize>,
    topologies: Vec<PathBuf>,
}

impl RunConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ranks(mut self, ranks: usize) -> Self {
        self.ranks = Some(ranks);
        self
    }
    pub fn progress(mut self, enabled: bool) -> Self {
        self.progress = Some(enabled);
        self
    }
    pub fn debug(mut self, level: u32) -> Self {
        self.debug = Some(level);
        self
    }
    pub fn max_line_length(mut self, length: usize) -> Self {
        self.max_line_length = Some(length);
        self
    }
    pub fn data_precision(mut self, digits: usize) -> Self {
        self.data_precision = Some(digits);
        self
    }
    pub fn topology(mut self, path: impl Into<PathBuf>) -> Self {
        self.topologies.push(path.into());
        self
    }
    pub fn topologies(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.topologies.extend(paths);
        self
    }

    pub fn build(self) -> Result<RunConfig, ConfigError> {
        let max_line_length = self
            .max_line_length
            .ok_or(ConfigError::MissingParameter("max_line_length"))?;
        if max_line_length == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "max_line_length",
                reason: "must be greater than zero".into(),
            });
        }
        let data_precision = self
            .data_precision
            .ok_or(ConfigError::MissingParameter("data_precision"))?;
        if data_precision > MAX_DATA_PRECISION {
            return Err(ConfigError::InvalidValue {
                parameter: "data_precision",
                reason: format!("at most {MAX_DATA_PRECISION} digits are supported"),
            });
        }
        Ok(RunConfig {
            ranks: self.ranks.ok_or(ConfigError::MissingParameter("ranks"))?,
            progress: self.progress.unwrap_or(true),
            debug: self.debug.unwrap_or(0),
            max_line_length,
            data_precision,
            topologies: self.topologies,
        })
    }
}
