use std::collections::BTreeMap;
use std::path::Path;

use gbdt::config::Config as GbdtConfig;
use gbdt::gradient_boost::GBDT;
use polars::prelude::*;
use tracing::debug;

use super::traits::{to_data_vec, Classifier};
use crate::error::{PipelineError, Result};

/// One sampled hyperparameter set for the gradient-boosted classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct GbdtParams {
    pub iterations: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub data_sample_ratio: f64,
    pub feature_sample_ratio: f64,
}

impl GbdtParams {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("iterations".to_string(), self.iterations.to_string()),
            ("max_depth".to_string(), self.max_depth.to_string()),
            ("learning_rate".to_string(), self.learning_rate.to_string()),
            (
                "data_sample_ratio".to_string(),
                self.data_sample_ratio.to_string(),
            ),
            (
                "feature_sample_ratio".to_string(),
                self.feature_sample_ratio.to_string(),
            ),
        ])
    }
}

/// Binary gradient-boosted classifier backed by the gbdt crate. Labels
/// are 0/1 codes, mapped internally to the -1/+1 the LogLikelyhood loss
/// expects; predict thresholds the returned probability at 0.5.
pub struct GbdtClassifier {
    params: GbdtParams,
    n_features: usize,
    model: Option<GBDT>,
}

impl GbdtClassifier {
    pub fn new(params: GbdtParams) -> Self {
        Self {
            params,
            n_features: 0,
            model: None,
        }
    }

    fn build_config(&self, n_features: usize) -> GbdtConfig {
        let mut config = GbdtConfig::new();
        config.set_feature_size(n_features);
        config.set_max_depth(self.params.max_depth as u32);
        config.set_iterations(self.params.iterations);
        config.set_shrinkage(self.params.learning_rate as f32);
        config.set_loss("LogLikelyhood");
        config.set_debug(false);
        config.set_data_sample_ratio(self.params.data_sample_ratio);
        config.set_feature_sample_ratio(self.params.feature_sample_ratio);
        config.set_training_optimization_level(2);
        config
    }
}

impl Classifier for GbdtClassifier {
    fn fit(&mut self, features: &DataFrame, labels: &[i64]) -> Result<()> {
        if features.height() != labels.len() {
            return Err(PipelineError::Model(format!(
                "feature rows {} != label rows {}",
                features.height(),
                labels.len()
            )));
        }
        let mut distinct: Vec<i64> = labels.to_vec();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() > 2 || distinct.iter().any(|&c| c != 0 && c != 1) {
            return Err(PipelineError::Model(format!(
                "binary classifier expects 0/1 labels, found {distinct:?}"
            )));
        }

        let mut train_data = to_data_vec(features)?;
        for (data, &label) in train_data.iter_mut().zip(labels.iter()) {
            // LogLikelyhood expects -1/+1 targets.
            let target = if label == 1 { 1.0 } else { -1.0 };
            data.label = target;
            data.target = target;
        }

        debug!(
            rows = features.height(),
            cols = features.width(),
            params = ?self.params,
            "fitting gbdt classifier"
        );
        let config = self.build_config(features.width());
        let mut gbdt = GBDT::new(&config);
        gbdt.fit(&mut train_data);
        self.n_features = features.width();
        self.model = Some(gbdt);
        Ok(())
    }

    fn predict(&self, features: &DataFrame) -> Result<Vec<i64>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| PipelineError::Model("classifier is not fitted".to_string()))?;
        if features.width() != self.n_features {
            return Err(PipelineError::schema(
                "model input",
                format!(
                    "expected {} feature columns, got {}",
                    self.n_features,
                    features.width()
                ),
            ));
        }
        let test_data = to_data_vec(features)?;
        let predictions = model.predict(&test_data);
        Ok(predictions
            .into_iter()
            .map(|p| if p >= 0.5 { 1 } else { 0 })
            .collect())
    }

    fn save(&self, path: &Path) -> Result<()> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| PipelineError::Model("cannot save an unfitted classifier".to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        model
            .save_model(path.to_str().ok_or_else(|| {
                PipelineError::Model(format!("non-UTF8 model path {}", path.display()))
            })?)
            .map_err(|e| PipelineError::Io {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> GbdtParams {
        GbdtParams {
            iterations: 20,
            max_depth: 3,
            learning_rate: 0.1,
            data_sample_ratio: 1.0,
            feature_sample_ratio: 1.0,
        }
    }

    fn separable_frame() -> (DataFrame, Vec<i64>) {
        let mut a = Vec::new();
        let mut b = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let class = i % 2;
            a.push(if class == 0 { i as f64 * 0.05 } else { 5.0 + i as f64 * 0.05 });
            b.push((i % 7) as f64);
            labels.push(class as i64);
        }
        (df!("a" => a, "b" => b).unwrap(), labels)
    }

    #[test]
    fn fits_and_predicts_separable_data() {
        let (df, labels) = separable_frame();
        let mut clf = GbdtClassifier::new(params());
        clf.fit(&df, &labels).unwrap();
        let predicted = clf.predict(&df).unwrap();
        let correct = predicted
            .iter()
            .zip(labels.iter())
            .filter(|(p, a)| p == a)
            .count();
        assert!(correct as f64 / labels.len() as f64 > 0.9);
    }

    #[test]
    fn predict_before_fit_is_a_model_error() {
        let (df, _) = separable_frame();
        let clf = GbdtClassifier::new(params());
        assert!(matches!(
            clf.predict(&df),
            Err(PipelineError::Model(_))
        ));
    }

    #[test]
    fn rejects_non_binary_labels() {
        let (df, mut labels) = separable_frame();
        labels[0] = 2;
        let mut clf = GbdtClassifier::new(params());
        assert!(matches!(
            clf.fit(&df, &labels),
            Err(PipelineError::Model(_))
        ));
    }

    #[test]
    fn save_round_trips_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("gbdt.model");
        let (df, labels) = separable_frame();
        let mut clf = GbdtClassifier::new(params());
        clf.fit(&df, &labels).unwrap();
        clf.save(&path).unwrap();
        assert!(path.exists());
    }
}
