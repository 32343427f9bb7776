use booking_pipeline::tracking::{MlflowTracker, NoopTracker};
use booking_pipeline::{Config, DataIngestion, DataPreprocessor, GcsClient, ModelTraining, PipelinePaths};
use tracing::info;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    info!(config = %config_path, "starting training pipeline");

    let config = Config::load(&config_path)?;
    let paths = PipelinePaths::default();

    // 1. Data ingestion
    let ingestion = DataIngestion::new(GcsClient::new(), &config.data_ingestion, &paths);
    ingestion.run()?;

    // 2. Data preprocessing
    let preprocessor = DataPreprocessor::new(
        &paths.train_file,
        &paths.test_file,
        &paths.processed_dir,
        &config,
    )?;
    preprocessor.process()?;

    // 3. Model training
    let training = ModelTraining::new(
        preprocessor.processed_train_path(),
        preprocessor.processed_test_path(),
        &paths.model_output,
        &config,
    );
    let metrics = match config.tracking.tracking_uri {
        Some(_) => {
            let tracker = MlflowTracker::start_run(&config.tracking)?;
            let metrics = training.run(&tracker)?;
            tracker.end_run()?;
            metrics
        }
        None => training.run(&NoopTracker)?,
    };

    info!(?metrics, "training pipeline completed");
    Ok(())
}
