use std::collections::BTreeMap;

use tracing::info;

use crate::error::{PipelineError, Result};

/// Binary classification metrics, positive class = 1. Zero denominators
/// yield 0.0 rather than NaN so the tracker payload stays well-formed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl ClassificationMetrics {
    pub fn compute(predicted: &[i64], actual: &[i64]) -> Result<Self> {
        if predicted.len() != actual.len() {
            return Err(PipelineError::Model(format!(
                "prediction count {} != label count {}",
                predicted.len(),
                actual.len()
            )));
        }
        if predicted.is_empty() {
            return Err(PipelineError::Model(
                "cannot evaluate on an empty test set".to_string(),
            ));
        }

        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut tn = 0usize;
        let mut fn_ = 0usize;
        for (&p, &a) in predicted.iter().zip(actual.iter()) {
            match (p == 1, a == 1) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, false) => tn += 1,
                (false, true) => fn_ += 1,
            }
        }

        let accuracy = (tp + tn) as f64 / predicted.len() as f64;
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        let metrics = Self {
            accuracy,
            precision,
            recall,
            f1,
        };
        info!(?metrics, "model evaluation metrics");
        Ok(metrics)
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("accuracy".to_string(), self.accuracy),
            ("precision".to_string(), self.precision),
            ("recall".to_string(), self.recall),
            ("f1_score".to_string(), self.f1),
        ])
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_confusion_matrix() {
        // tp=2, fp=1, tn=1, fn=1
        let predicted = [1, 1, 1, 0, 0];
        let actual = [1, 1, 0, 0, 1];
        let m = ClassificationMetrics::compute(&predicted, &actual).unwrap();
        assert!((m.accuracy - 0.6).abs() < 1e-12);
        assert!((m.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1 - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_predictions_do_not_produce_nan() {
        let m = ClassificationMetrics::compute(&[0, 0], &[1, 1]).unwrap();
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
    }

    #[test]
    fn mismatched_lengths_error() {
        assert!(ClassificationMetrics::compute(&[1], &[1, 0]).is_err());
    }

    #[test]
    fn map_has_all_four_metrics() {
        let m = ClassificationMetrics::compute(&[1, 0], &[1, 0]).unwrap();
        let map = m.to_map();
        assert_eq!(map.len(), 4);
        assert_eq!(map["accuracy"], 1.0);
    }
}
