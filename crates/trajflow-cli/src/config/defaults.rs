use trajflow::engine::config::{DEFAULT_DATA_PRECISION, DEFAULT_MAX_LINE_LENGTH};

pub struct DefaultsConfig {
    pub ranks: usize,
    pub progress: bool,
    pub debug: u32,
    pub max_line_length: usize,
    pub data_precision: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            ranks: 1,
            progress: true,
            debug: 0,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            data_precision: DEFAULT_DATA_PRECISION,
        }
    }
}
