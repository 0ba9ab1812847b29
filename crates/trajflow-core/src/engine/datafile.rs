//! Data file output.
//!
//! Each [`DataFile`] is a table with a `#Frame` column followed by one column per data set.
//! Files ending in `.csv` are comma-delimited; everything else is space-delimited.

use super::datasets::{DataSetId, DataSetList};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DataFileError {
    #[error("Failed to write data file '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Failed to flush data file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

const MISSING: &str = "-";

#[derive(Debug, Clone)]
pub struct DataFile {
    path: PathBuf,
    sets: Vec<DataSetId>,
}

impl DataFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sets(&self) -> &[DataSetId] {
        &self.sets
    }

    fn delimiter(&self) -> u8 {
        match self.path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => b',',
            _ => b' ',
        }
    }

    fn write(&self, datasets: &DataSetList, precision: usize) -> Result<(), DataFileError> {
        let csv_err = |source| DataFileError::Csv {
            path: self.path.clone(),
            source,
        };
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter())
            .from_path(&self.path)
            .map_err(csv_err)?;

        let columns: Vec<_> = self.sets.iter().filter_map(|&id| datasets.get(id)).collect();
        let mut header = vec!["#Frame".to_string()];
        header.extend(columns.iter().map(|set| set.name().to_string()));
        writer.write_record(&header).map_err(csv_err)?;

        let frames = columns.iter().map(|set| set.len()).max().unwrap_or(0);
        let mut rows = 0usize;
        for frame in 0..frames {
            let values: Vec<Option<f64>> = columns.iter().map(|set| set.get(frame)).collect();
            if values.iter().all(Option::is_none) {
                continue;
            }
            let mut record = vec![(frame + 1).to_string()];
            record.extend(values.into_iter().map(|v| match v {
                Some(v) => format!("{v:.precision$}"),
                None => MISSING.to_string(),
            }));
            writer.write_record(&record).map_err(csv_err)?;
            rows += 1;
        }
        writer.flush().map_err(|source| DataFileError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), rows, "Wrote data file.");
        Ok(())
    }
}

#[derive(Debug)]
pub struct DataFileList {
    files: Vec<DataFile>,
    precision: usize,
}

impl DataFileList {
    pub fn new(precision: usize) -> Self {
        Self {
            files: Vec::new(),
            precision,
        }
    }

    /// Appends `set` to the file at `path`, creating the file entry on first use.
    pub fn add(&mut self, path: impl AsRef<Path>, set: DataSetId) {
        let path = path.as_ref();
        match self.files.iter_mut().find(|f| f.path == path) {
            Some(file) => file.sets.push(set),
            None => self.files.push(DataFile {
                path: path.to_path_buf(),
                sets: vec![set],
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataFile> {
        self.files.iter()
    }

    pub fn info(&self, datasets: &DataSetList) {
        if self.files.is_empty() {
            return;
        }
        info!("Data files:");
        for file in &self.files {
            let names: Vec<&str> = file
                .sets
                .iter()
                .filter_map(|&id| datasets.get(id).map(|s| s.name()))
                .collect();
            info!("  {}: {}", file.path.display(), names.join(" "));
        }
    }

    pub fn write(&self, datasets: &DataSetList) -> Result<(), DataFileError> {
        for file in &self.files {
            file.write(datasets, self.precision)?;
        }
        Ok(())
    }
}
