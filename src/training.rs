use std::path::{Path, PathBuf};

use polars::prelude::*;
use rand::prelude::*;
use tracing::{debug, info, warn};

use crate::balance::label_codes;
use crate::config::{Config, TrainingConfig};
use crate::dataset::load_data;
use crate::error::{PipelineError, Result};
use crate::metrics::ClassificationMetrics;
use crate::models::{Classifier, GbdtClassifier, GbdtParams};
use crate::preprocessing::TARGET_COLUMN;
use crate::tracking::ExperimentTracker;

/// Trains the final classifier on the processed datasets: randomized
/// hyperparameter search with cross-validation, refit, evaluate, save,
/// and log everything to the experiment tracker.
pub struct ModelTraining {
    train_path: PathBuf,
    test_path: PathBuf,
    model_output_path: PathBuf,
    config: TrainingConfig,
}

impl ModelTraining {
    pub fn new(
        train_path: impl Into<PathBuf>,
        test_path: impl Into<PathBuf>,
        model_output_path: impl Into<PathBuf>,
        config: &Config,
    ) -> Self {
        Self {
            train_path: train_path.into(),
            test_path: test_path.into(),
            model_output_path: model_output_path.into(),
            config: config.training.clone(),
        }
    }

    pub fn run(&self, tracker: &dyn ExperimentTracker) -> Result<ClassificationMetrics> {
        info!("starting model training process");

        // Dataset artifacts go up front, while failing the run is still
        // cheap; after the model is saved tracker errors only warn.
        tracker.log_artifact(&self.train_path)?;
        tracker.log_artifact(&self.test_path)?;

        let (x_train, y_train) = self.load_and_split(&self.train_path)?;
        let (x_test, y_test) = self.load_and_split(&self.test_path)?;

        let (best_params, best_score) = self.random_search(&x_train, &y_train)?;
        info!(?best_params, cv_accuracy = best_score, "best parameters found");

        let mut model = GbdtClassifier::new(best_params.clone());
        model.fit(&x_train, &y_train)?;

        let predicted = model.predict(&x_test)?;
        let metrics = ClassificationMetrics::compute(&predicted, &y_test)?;

        model.save(&self.model_output_path)?;
        info!(path = %self.model_output_path.display(), "model saved");

        // The model artifact is on disk; losing tracking data is
        // recoverable, losing the model is not.
        let logged = tracker
            .log_artifact(&self.model_output_path)
            .and_then(|_| tracker.log_params(&best_params.to_map()))
            .and_then(|_| tracker.log_metrics(&metrics.to_map()));
        if let Err(e) = logged {
            warn!(error = %e, "experiment tracking failed after model save, continuing");
        }

        info!("model training process completed");
        Ok(metrics)
    }

    fn load_and_split(&self, path: &Path) -> Result<(DataFrame, Vec<i64>)> {
        let df = load_data(path)?;
        let y = label_codes(&df, TARGET_COLUMN)?;
        let x = df.drop(TARGET_COLUMN).map_err(|_| {
            PipelineError::schema(
                "training",
                format!("label column '{TARGET_COLUMN}' missing from {}", path.display()),
            )
        })?;
        Ok((x, y))
    }

    /// Sample `n_iter` parameter sets and score each by mean accuracy
    /// over `cv_folds`-fold cross-validation. Deterministic for a fixed
    /// seed; the first candidate wins ties.
    fn random_search(&self, x: &DataFrame, y: &[i64]) -> Result<(GbdtParams, f64)> {
        if x.height() < self.config.cv_folds {
            return Err(PipelineError::Model(format!(
                "{} training rows cannot be split into {} folds",
                x.height(),
                self.config.cv_folds
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut best: Option<(GbdtParams, f64)> = None;
        for iter in 0..self.config.n_iter {
            let params = sample_params(&self.config, &mut rng);
            let score = self.cv_score(x, y, &params)?;
            debug!(iter, ?params, cv_accuracy = score, "search candidate scored");
            let better = match &best {
                Some((_, s)) => score > *s,
                None => true,
            };
            if better {
                best = Some((params, score));
            }
        }
        // n_iter >= 1 is enforced at config load.
        best.ok_or_else(|| PipelineError::Model("hyperparameter search produced no candidate".to_string()))
    }

    fn cv_score(&self, x: &DataFrame, y: &[i64], params: &GbdtParams) -> Result<f64> {
        let folds = self.config.cv_folds;
        let mut total = 0.0;
        for fold in 0..folds {
            let mut fit_idx: Vec<u32> = Vec::new();
            let mut val_idx: Vec<u32> = Vec::new();
            for i in 0..x.height() {
                if i % folds == fold {
                    val_idx.push(i as u32);
                } else {
                    fit_idx.push(i as u32);
                }
            }
            let x_fit = x.take(&IdxCa::from_vec("idx".into(), fit_idx.clone()))?;
            let x_val = x.take(&IdxCa::from_vec("idx".into(), val_idx.clone()))?;
            let y_fit: Vec<i64> = fit_idx.iter().map(|&i| y[i as usize]).collect();
            let y_val: Vec<i64> = val_idx.iter().map(|&i| y[i as usize]).collect();

            let mut model = GbdtClassifier::new(params.clone());
            model.fit(&x_fit, &y_fit)?;
            let predicted = model.predict(&x_val)?;
            let correct = predicted
                .iter()
                .zip(y_val.iter())
                .filter(|(p, a)| p == a)
                .count();
            total += correct as f64 / y_val.len().max(1) as f64;
        }
        Ok(total / folds as f64)
    }
}

fn sample_params(config: &TrainingConfig, rng: &mut StdRng) -> GbdtParams {
    GbdtParams {
        iterations: rng.gen_range(config.iterations.0..=config.iterations.1),
        max_depth: rng.gen_range(config.max_depth.0..=config.max_depth.1),
        learning_rate: rng.gen_range(config.learning_rate.0..=config.learning_rate.1),
        data_sample_ratio: rng
            .gen_range(config.data_sample_ratio.0..=config.data_sample_ratio.1),
        feature_sample_ratio: rng
            .gen_range(config.feature_sample_ratio.0..=config.feature_sample_ratio.1),
    }
}
