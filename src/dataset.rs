use std::fs::{self, File};
use std::path::Path;

use polars::prelude::*;
use tracing::{error, info};

use crate::error::{PipelineError, Result};

/// Load a delimited-text dataset with a header row.
pub fn load_data<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
    let path = path.as_ref();
    if !path.exists() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        error!(path = %path.display(), "dataset file missing");
        return Err(PipelineError::io(path, err));
    }
    let df = LazyCsvReader::new(path)
        .finish()
        .and_then(|lf| lf.collect())
        .map_err(|e| {
            error!(path = %path.display(), error = %e, "failed to read dataset");
            PipelineError::Io {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
            }
        })?;
    info!(path = %path.display(), rows = df.height(), cols = df.width(), "dataset loaded");
    Ok(df)
}

/// Write a dataset as delimited text with a header row. Column names and
/// order are preserved and no row index is written.
pub fn save_data(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    let mut file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .map_err(|e| {
            error!(path = %path.display(), error = %e, "failed to write dataset");
            PipelineError::Io {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            }
        })?;
    info!(path = %path.display(), rows = df.height(), "dataset saved");
    Ok(())
}

/// Cleaned and label-encoded frame: identifier column gone, duplicates
/// removed, categorical columns rewritten as integer codes. Produced only
/// by `DataPreprocessor::preprocess`.
#[derive(Debug, Clone)]
pub struct EncodedData(DataFrame);

/// Class-balanced frame: every label value has equal representation.
/// Produced only by `Smote::balance`, which requires an `EncodedData`
/// input, so balancing before encoding does not compile.
#[derive(Debug, Clone)]
pub struct BalancedData(DataFrame);

/// Dimensionality-reduced frame holding the selected features plus the
/// label column, in the exact order shared between train and test.
#[derive(Debug, Clone)]
pub struct SelectedData(DataFrame);

impl EncodedData {
    pub(crate) fn new(df: DataFrame) -> Self {
        Self(df)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.0
    }

    pub fn into_frame(self) -> DataFrame {
        self.0
    }
}

impl BalancedData {
    pub(crate) fn new(df: DataFrame) -> Self {
        Self(df)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.0
    }

    pub fn into_frame(self) -> DataFrame {
        self.0
    }
}

impl SelectedData {
    pub(crate) fn new(df: DataFrame) -> Self {
        Self(df)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.0
    }

    pub fn into_frame(self) -> DataFrame {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_round_trip_preserves_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");

        let mut df = df!(
            "lead_time" => &[12i64, 30, 7],
            "avg_price" => &[88.5f64, 120.0, 60.25],
            "booking_status" => &[0i64, 1, 0],
        )
        .unwrap();

        save_data(&mut df, &path).unwrap();
        let loaded = load_data(&path).unwrap();

        let names: Vec<String> = loaded
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names, vec!["lead_time", "avg_price", "booking_status"]);
        assert_eq!(loaded.height(), 3);
    }

    #[test]
    fn load_missing_path_is_io_error() {
        let err = load_data("no/such/file.csv").unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
