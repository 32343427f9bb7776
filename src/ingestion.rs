use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use rand::prelude::*;
use tracing::{error, info};

use crate::config::{DataIngestionConfig, PipelinePaths};
use crate::dataset::{load_data, save_data};
use crate::error::{PipelineError, Result};

/// Blob-storage collaborator. The pipeline only ever downloads one object
/// per run; everything else about the store is out of scope.
pub trait ObjectStore {
    fn download(&self, bucket: &str, object: &str, dest: &Path) -> Result<PathBuf>;
}

/// Unauthenticated download from a public GCS bucket over HTTPS.
pub struct GcsClient {
    base_url: String,
}

impl GcsClient {
    pub fn new() -> Self {
        Self {
            base_url: "https://storage.googleapis.com".to_string(),
        }
    }

    /// Point at a different endpoint, e.g. a local fixture server.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for GcsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for GcsClient {
    fn download(&self, bucket: &str, object: &str, dest: &Path) -> Result<PathBuf> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        let url = format!("{}/{bucket}/{object}", self.base_url);
        let response = ureq::get(&url).call().map_err(|e| {
            error!(%url, error = %e, "object download failed");
            PipelineError::Io {
                path: url.clone(),
                source: io::Error::new(io::ErrorKind::Other, e.to_string()),
            }
        })?;
        let mut reader = response.into_reader();
        let mut file = File::create(dest).map_err(|e| PipelineError::io(dest, e))?;
        let bytes = io::copy(&mut reader, &mut file).map_err(|e| PipelineError::io(dest, e))?;
        info!(bucket, object, bytes, dest = %dest.display(), "object downloaded");
        Ok(dest.to_path_buf())
    }
}

/// Downloads the raw dataset and splits it into train/test files.
pub struct DataIngestion<S: ObjectStore> {
    store: S,
    config: DataIngestionConfig,
    raw_file: PathBuf,
    train_file: PathBuf,
    test_file: PathBuf,
}

impl<S: ObjectStore> DataIngestion<S> {
    pub fn new(store: S, config: &DataIngestionConfig, paths: &PipelinePaths) -> Self {
        info!(
            bucket = %config.bucket_name,
            file = %config.bucket_file_name,
            train_ratio = config.train_ratio,
            "data ingestion initialized"
        );
        Self {
            store,
            config: config.clone(),
            raw_file: paths.raw_file.clone(),
            train_file: paths.train_file.clone(),
            test_file: paths.test_file.clone(),
        }
    }

    pub fn run(&self) -> Result<()> {
        self.store.download(
            &self.config.bucket_name,
            &self.config.bucket_file_name,
            &self.raw_file,
        )?;
        self.split_data()
    }

    /// Deterministic row split: shuffle indices with the configured seed,
    /// cut at train_ratio, keep original row order within each side.
    fn split_data(&self) -> Result<()> {
        info!(ratio = self.config.train_ratio, "splitting data into train and test sets");
        let df = load_data(&self.raw_file)?;
        if df.height() < 2 {
            return Err(PipelineError::schema(
                "ingestion",
                format!("cannot split {} row(s) into train and test", df.height()),
            ));
        }

        let mut indices: Vec<u32> = (0..df.height() as u32).collect();
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        indices.shuffle(&mut rng);

        let n_train = ((df.height() as f64 * self.config.train_ratio).round() as usize)
            .clamp(1, df.height() - 1);
        let (train_idx, test_idx) = indices.split_at(n_train);
        let mut train_idx = train_idx.to_vec();
        let mut test_idx = test_idx.to_vec();
        train_idx.sort_unstable();
        test_idx.sort_unstable();

        let mut train = df.take(&IdxCa::from_vec("idx".into(), train_idx))?;
        let mut test = df.take(&IdxCa::from_vec("idx".into(), test_idx))?;

        save_data(&mut train, &self.train_file)?;
        save_data(&mut test, &self.test_file)?;
        info!(train_rows = train.height(), test_rows = test.height(), "data split complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelinePaths;

    /// Test double: "downloads" by copying a local file.
    struct LocalStore {
        source: PathBuf,
    }

    impl ObjectStore for LocalStore {
        fn download(&self, _bucket: &str, _object: &str, dest: &Path) -> Result<PathBuf> {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
            }
            fs::copy(&self.source, dest).map_err(|e| PipelineError::io(&self.source, e))?;
            Ok(dest.to_path_buf())
        }
    }

    fn ingestion_config(seed: u64) -> DataIngestionConfig {
        DataIngestionConfig {
            bucket_name: "bucket".to_string(),
            bucket_file_name: "bookings.csv".to_string(),
            train_ratio: 0.8,
            seed,
        }
    }

    fn write_source(dir: &Path) -> PathBuf {
        let source = dir.join("source.csv");
        let mut rows = String::from("Booking_ID,lead_time,booking_status\n");
        for i in 0..10 {
            rows.push_str(&format!("B{i:03},{i},{}\n", i % 2));
        }
        fs::write(&source, rows).unwrap();
        source
    }

    #[test]
    fn run_downloads_and_splits_at_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path());
        let paths = PipelinePaths::new(dir.path().join("artifacts"));

        let ingestion = DataIngestion::new(LocalStore { source }, &ingestion_config(42), &paths);
        ingestion.run().unwrap();

        let train = load_data(&paths.train_file).unwrap();
        let test = load_data(&paths.test_file).unwrap();
        assert_eq!(train.height(), 8);
        assert_eq!(test.height(), 2);
        assert_eq!(train.width(), 3);
    }

    #[test]
    fn split_is_deterministic_for_a_seed() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let mut frames = Vec::new();
        for dir in [&dir_a, &dir_b] {
            let source = write_source(dir.path());
            let paths = PipelinePaths::new(dir.path().join("artifacts"));
            let ingestion =
                DataIngestion::new(LocalStore { source }, &ingestion_config(7), &paths);
            ingestion.run().unwrap();
            frames.push(load_data(&paths.train_file).unwrap());
        }
        assert!(frames[0].equals(&frames[1]));
    }

    #[test]
    fn missing_object_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PipelinePaths::new(dir.path().join("artifacts"));
        let store = LocalStore {
            source: dir.path().join("does-not-exist.csv"),
        };
        let ingestion = DataIngestion::new(store, &ingestion_config(1), &paths);
        assert!(matches!(
            ingestion.run(),
            Err(PipelineError::Io { .. })
        ));
    }
}
