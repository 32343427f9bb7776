use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::{debug, error, info, warn};

use crate::balance::Smote;
use crate::config::{Config, DataProcessingConfig};
use crate::dataset::{load_data, save_data, EncodedData};
use crate::error::{PipelineError, Result};
use crate::selection::{apply_selection, select_features};

/// Identifier column dropped during cleaning. Tolerated when absent.
pub const ID_COLUMN: &str = "Booking_ID";
/// Target label column.
pub const TARGET_COLUMN: &str = "booking_status";

/// Converts raw train/test datasets into the model-ready processed files:
/// clean → encode → skew-correct → balance → select → save.
pub struct DataPreprocessor {
    train_path: PathBuf,
    test_path: PathBuf,
    processed_train: PathBuf,
    processed_test: PathBuf,
    config: DataProcessingConfig,
}

impl DataPreprocessor {
    pub fn new(
        train_path: impl Into<PathBuf>,
        test_path: impl Into<PathBuf>,
        processed_dir: &Path,
        config: &Config,
    ) -> Result<Self> {
        if !processed_dir.exists() {
            fs::create_dir_all(processed_dir).map_err(|e| PipelineError::io(processed_dir, e))?;
            info!(dir = %processed_dir.display(), "created processed data directory");
        }
        Ok(Self {
            train_path: train_path.into(),
            test_path: test_path.into(),
            processed_train: processed_dir.join("processed_train.csv"),
            processed_test: processed_dir.join("processed_test.csv"),
            config: config.data_processing.clone(),
        })
    }

    /// Pure cleaning transform: drop the identifier column, remove exact
    /// duplicates, label-encode categorical columns and log-transform
    /// skewed numerical columns. No I/O beyond logging.
    pub fn preprocess(&self, df: DataFrame) -> Result<EncodedData> {
        info!(rows = df.height(), "starting preprocessing");

        let mut df = self.drop_identifier(df)?;
        df = df
            .lazy()
            .unique_stable(None, UniqueKeepStrategy::First)
            .collect()?;
        debug!(rows = df.height(), "duplicates removed");

        for col_name in &self.config.categorical_features {
            let mapping = encode_column(&mut df, col_name)?;
            if let Some(mapping) = mapping {
                info!(column = %col_name, ?mapping, "label mapping");
            }
        }

        for col_name in &self.config.numerical_features {
            self.treat_skew(&mut df, col_name)?;
        }
        info!("skewness treatment done");

        Ok(EncodedData::new(df))
    }

    fn drop_identifier(&self, df: DataFrame) -> Result<DataFrame> {
        let present = df
            .get_column_names()
            .iter()
            .any(|name| name.as_str() == ID_COLUMN);
        if present {
            Ok(df.drop(ID_COLUMN)?)
        } else {
            warn!(column = ID_COLUMN, "identifier column absent, skipping drop");
            Ok(df)
        }
    }

    fn treat_skew(&self, df: &mut DataFrame, name: &str) -> Result<()> {
        let transformed = {
            let col = df.column(name).map_err(|_| {
                error!(column = %name, "configured numerical column missing");
                PipelineError::schema(
                    "preprocessing",
                    format!("numerical column '{name}' not found"),
                )
            })?;
            if !is_numeric_dtype(col.dtype()) {
                error!(column = %name, dtype = ?col.dtype(), "non-numeric data in numerical column");
                return Err(PipelineError::schema(
                    "preprocessing",
                    format!("column '{name}' has non-numeric dtype {:?}", col.dtype()),
                ));
            }

            let casted = col.cast(&DataType::Float64)?;
            let ca = casted.f64()?;
            let values: Vec<f64> = ca.into_iter().flatten().collect();
            let skew = sample_skewness(&values);
            debug!(column = %name, skewness = skew, "skewness computed");
            if skew <= self.config.skew_threshold {
                return Ok(());
            }

            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            if min <= -1.0 {
                error!(column = %name, min, "log1p precondition violated");
                return Err(PipelineError::NumericDomain {
                    column: name.to_string(),
                    message: format!("log(1+x) requires values > -1, found minimum {min}"),
                });
            }
            info!(column = %name, skewness = skew, "applying log(1+x) transform");
            ca.apply_values(|v| v.ln_1p()).into_series()
        };
        df.with_column(transformed)?;
        Ok(())
    }

    /// Full processing stage: load the raw train/test splits, clean and
    /// balance both, select features on the train set and project the
    /// test set onto the same columns, then persist both.
    pub fn process(&self) -> Result<()> {
        info!("starting data processing pipeline");

        let train = load_data(&self.train_path)?;
        let test = load_data(&self.test_path)?;

        let train = self.preprocess(train)?;
        let test = self.preprocess(test)?;

        let smote = Smote::new().with_seed(self.config.seed);
        let train = smote.balance(train, TARGET_COLUMN)?;
        let test = smote.balance(test, TARGET_COLUMN)?;

        let (train, selected_columns) = select_features(
            &train,
            self.config.no_of_features_to_select,
            TARGET_COLUMN,
            self.config.seed,
        )?;
        // Test set must end with exactly the train columns, in order.
        let test = apply_selection(&test, &selected_columns)?;

        save_data(&mut train.into_frame(), &self.processed_train)?;
        save_data(&mut test.into_frame(), &self.processed_test)?;

        info!("data processing pipeline completed");
        Ok(())
    }

    pub fn processed_train_path(&self) -> &Path {
        &self.processed_train
    }

    pub fn processed_test_path(&self) -> &Path {
        &self.processed_test
    }
}

pub(crate) fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float32
            | DataType::Float64
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Rewrite a categorical string column as integer codes assigned in sorted
/// order of the distinct values. Integer columns pass through unchanged so
/// re-running on already-encoded data is a no-op. Returns the mapping for
/// audit logging, or None for a pass-through.
fn encode_column(df: &mut DataFrame, name: &str) -> Result<Option<BTreeMap<String, i64>>> {
    let (series, mapping) = {
        let col = df.column(name).map_err(|_| {
            error!(column = %name, "configured categorical column missing");
            PipelineError::schema(
                "preprocessing",
                format!("categorical column '{name}' not found"),
            )
        })?;
        match col.dtype() {
            DataType::String => {
                let ca = col.str()?;
                let mut distinct: BTreeSet<&str> = BTreeSet::new();
                for value in ca.into_iter() {
                    match value {
                        Some(v) => {
                            distinct.insert(v);
                        }
                        None => {
                            return Err(PipelineError::schema(
                                "preprocessing",
                                format!("null value in categorical column '{name}'"),
                            ));
                        }
                    }
                }
                let mapping: BTreeMap<String, i64> = distinct
                    .into_iter()
                    .enumerate()
                    .map(|(code, value)| (value.to_string(), code as i64))
                    .collect();
                let codes: Vec<i64> = ca
                    .into_iter()
                    .map(|v| mapping[v.unwrap_or_default()])
                    .collect();
                (Series::new(name.into(), codes), Some(mapping))
            }
            dt if is_integer_dtype(dt) => {
                debug!(column = %name, "categorical column already integer-encoded");
                return Ok(None);
            }
            other => {
                return Err(PipelineError::schema(
                    "preprocessing",
                    format!("categorical column '{name}' has unsupported dtype {other:?}"),
                ));
            }
        }
    };
    df.with_column(series)?;
    Ok(mapping)
}

fn is_integer_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Adjusted Fisher-Pearson sample skewness (the pandas default), computed
/// over non-null values. Returns 0.0 for fewer than 3 values or a
/// constant column.
pub fn sample_skewness(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 3 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n;
    let m2 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let m3 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / n;
    if m2 <= 0.0 {
        return 0.0;
    }
    let g1 = m3 / m2.powf(1.5);
    g1 * ((n * (n - 1.0)).sqrt() / (n - 2.0))
}
