use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub data_ingestion: DataIngestionConfig,
    pub data_processing: DataProcessingConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataIngestionConfig {
    pub bucket_name: String,
    pub bucket_file_name: String,
    pub train_ratio: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataProcessingConfig {
    pub categorical_features: Vec<String>,
    pub numerical_features: Vec<String>,
    pub skew_threshold: f64,
    pub no_of_features_to_select: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Randomized-search settings. Every knob has a default mirroring the
/// search space the pipeline was tuned with, so the `training` section is
/// optional in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TrainingConfig {
    pub n_iter: usize,
    pub cv_folds: usize,
    pub seed: u64,
    pub iterations: (usize, usize),
    pub max_depth: (usize, usize),
    pub learning_rate: (f64, f64),
    pub data_sample_ratio: (f64, f64),
    pub feature_sample_ratio: (f64, f64),
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_iter: 5,
            cv_folds: 3,
            seed: 42,
            iterations: (100, 500),
            max_depth: (3, 12),
            learning_rate: (0.01, 0.2),
            data_sample_ratio: (0.5, 1.0),
            feature_sample_ratio: (0.5, 1.0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TrackingConfig {
    /// MLflow tracking server, e.g. "http://localhost:5000". None disables
    /// remote tracking and the run logs to a no-op tracker.
    pub tracking_uri: Option<String>,
    pub experiment_id: String,
    pub artifact_dir: PathBuf,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tracking_uri: None,
            experiment_id: "0".to_string(),
            artifact_dir: PathBuf::from("artifacts/mlruns"),
        }
    }
}

fn default_seed() -> u64 {
    42
}

impl Config {
    /// Load and validate the pipeline configuration. Any missing or
    /// unknown key, or an out-of-range value, fails here rather than deep
    /// inside a transform.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let ratio = self.data_ingestion.train_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(PipelineError::Config(format!(
                "train_ratio must be in (0, 1), got {ratio}"
            )));
        }
        if !self.data_processing.skew_threshold.is_finite() {
            return Err(PipelineError::Config(
                "skew_threshold must be a finite number".to_string(),
            ));
        }
        if self.data_processing.no_of_features_to_select == 0 {
            return Err(PipelineError::Config(
                "no_of_features_to_select must be at least 1".to_string(),
            ));
        }
        if let Some(col) = self
            .data_processing
            .categorical_features
            .iter()
            .find(|c| self.data_processing.numerical_features.contains(c))
        {
            return Err(PipelineError::Config(format!(
                "column '{col}' listed as both categorical and numerical"
            )));
        }
        if self.training.cv_folds < 2 {
            return Err(PipelineError::Config(
                "cv_folds must be at least 2".to_string(),
            ));
        }
        if self.training.n_iter == 0 {
            return Err(PipelineError::Config(
                "n_iter must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Filesystem layout for one pipeline run. Paths are configuration, not
/// constants baked into the stages.
#[derive(Debug, Clone)]
pub struct PipelinePaths {
    pub raw_dir: PathBuf,
    pub raw_file: PathBuf,
    pub train_file: PathBuf,
    pub test_file: PathBuf,
    pub processed_dir: PathBuf,
    pub processed_train: PathBuf,
    pub processed_test: PathBuf,
    pub model_output: PathBuf,
}

impl PipelinePaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        let raw_dir = root.join("raw");
        let processed_dir = root.join("processed");
        Self {
            raw_file: raw_dir.join("raw.csv"),
            train_file: raw_dir.join("train.csv"),
            test_file: raw_dir.join("test.csv"),
            processed_train: processed_dir.join("processed_train.csv"),
            processed_test: processed_dir.join("processed_test.csv"),
            model_output: root.join("models").join("gbdt.model"),
            raw_dir,
            processed_dir,
        }
    }
}

impl Default for PipelinePaths {
    fn default() -> Self {
        Self::new("artifacts")
    }
}
