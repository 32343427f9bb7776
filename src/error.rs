use std::path::Path;

use polars::error::PolarsError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error taxonomy for the whole pipeline. Every stage wraps lower-level
/// failures into one of these kinds with enough context (stage, column,
/// path) to diagnose a failed run from the logs alone.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("schema error in {stage}: {message}")]
    Schema { stage: &'static str, message: String },

    #[error("numeric domain error in column '{column}': {message}")]
    NumericDomain { column: String, message: String },

    #[error("insufficient samples for class {class}: found {count}, need at least 2 for interpolation")]
    InsufficientSamples { class: i64, count: usize },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dataframe error: {0}")]
    Frame(#[from] PolarsError),

    #[error("tracking error: {0}")]
    Tracking(String),

    #[error("model error: {0}")]
    Model(String),
}

impl PipelineError {
    pub fn schema(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Schema {
            stage,
            message: message.into(),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
