pub mod balance;
pub mod config;
pub mod dataset;
pub mod error;
pub mod ingestion;
pub mod metrics;
pub mod models;
pub mod preprocessing;
pub mod selection;
pub mod tracking;
pub mod training;

pub use config::{Config, PipelinePaths};
pub use error::{PipelineError, Result};
pub use ingestion::{DataIngestion, GcsClient};
pub use preprocessing::DataPreprocessor;
pub use training::ModelTraining;
