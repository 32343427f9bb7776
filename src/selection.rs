use std::collections::HashMap;

use ndarray::Array2;
use polars::prelude::*;
use rand::prelude::*;
use tracing::{info, warn};

use crate::balance::{feature_matrix, label_codes};
use crate::dataset::{BalancedData, SelectedData};
use crate::error::{PipelineError, Result};

/// Rank features on the balanced training set and keep the top `k` plus
/// the label column. The returned column list (label included, in final
/// order) is what `apply_selection` projects the test set onto.
pub fn select_features(
    data: &BalancedData,
    k: usize,
    label: &str,
    seed: u64,
) -> Result<(SelectedData, Vec<String>)> {
    info!("starting feature selection");
    let df = data.frame();
    let (x, feature_names) = feature_matrix(df, label)?;
    let y = label_codes(df, label)?;

    let importances = ImportanceForest::new(seed).fit(&x, &y)?;

    // Descending by importance, ties broken by original column order.
    let mut ranked: Vec<usize> = (0..feature_names.len()).collect();
    ranked.sort_by(|&a, &b| {
        importances[b]
            .partial_cmp(&importances[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let k = if k > feature_names.len() {
        warn!(
            requested = k,
            available = feature_names.len(),
            "fewer features than requested, keeping all"
        );
        feature_names.len()
    } else {
        k
    };

    let mut selected: Vec<String> = ranked[..k]
        .iter()
        .map(|&i| feature_names[i].clone())
        .collect();
    selected.push(label.to_string());
    info!(top = k, columns = ?selected, "features selected");

    let reduced = df.select(selected.iter().cloned())?;
    Ok((SelectedData::new(reduced), selected))
}

/// Project a dataset onto exactly `columns`, in order. Guards against
/// train/test drift: any missing column is a schema error, not a silent
/// reindex.
pub fn apply_selection(data: &BalancedData, columns: &[String]) -> Result<SelectedData> {
    let df = data.frame();
    for name in columns {
        if df.column(name.as_str()).is_err() {
            return Err(PipelineError::schema(
                "feature selection",
                format!("column '{name}' selected on train is absent from test set"),
            ));
        }
    }
    Ok(SelectedData::new(df.select(columns.iter().cloned())?))
}

/// Small seeded ensemble of Gini decision trees over bootstrap samples,
/// used only to rank features by mean decrease in impurity. Not a
/// predictive model; the classifier proper lives in `models`.
#[derive(Debug, Clone)]
pub struct ImportanceForest {
    n_trees: usize,
    max_depth: usize,
    min_samples_split: usize,
    seed: u64,
}

impl ImportanceForest {
    pub fn new(seed: u64) -> Self {
        Self {
            n_trees: 25,
            max_depth: 8,
            min_samples_split: 4,
            seed,
        }
    }

    pub fn with_n_trees(mut self, n: usize) -> Self {
        self.n_trees = n.max(1);
        self
    }

    /// Fit the forest and return per-feature importances normalized to
    /// sum to 1 (all zeros when no split ever improves impurity).
    pub fn fit(&self, x: &Array2<f64>, y: &[i64]) -> Result<Vec<f64>> {
        let n_rows = x.nrows();
        let n_features = x.ncols();
        if n_rows == 0 || n_features == 0 {
            return Err(PipelineError::schema(
                "feature selection",
                "cannot rank features of an empty dataset",
            ));
        }
        if n_rows != y.len() {
            return Err(PipelineError::schema(
                "feature selection",
                format!("feature rows {n_rows} != label rows {}", y.len()),
            ));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let max_features = (n_features as f64).sqrt().ceil() as usize;
        let mut importances = vec![0.0; n_features];

        for _ in 0..self.n_trees {
            let sample: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect();
            self.grow(
                x,
                y,
                sample,
                0,
                max_features,
                n_rows as f64,
                &mut rng,
                &mut importances,
            );
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        Ok(importances)
    }

    #[allow(clippy::too_many_arguments)]
    fn grow(
        &self,
        x: &Array2<f64>,
        y: &[i64],
        indices: Vec<usize>,
        depth: usize,
        max_features: usize,
        n_total: f64,
        rng: &mut StdRng,
        importances: &mut [f64],
    ) {
        let node_impurity = gini(y, &indices);
        if depth >= self.max_depth
            || indices.len() < self.min_samples_split
            || node_impurity == 0.0
        {
            return;
        }

        let candidates = rand::seq::index::sample(rng, x.ncols(), max_features.min(x.ncols()));
        let mut candidates: Vec<usize> = candidates.into_iter().collect();
        candidates.sort_unstable();

        let mut best: Option<(usize, f64, f64)> = None; // (feature, threshold, weighted impurity)
        for &feature in &candidates {
            if let Some((threshold, weighted)) = best_split(x, y, &indices, feature) {
                let better = match best {
                    Some((_, _, w)) => weighted < w,
                    None => true,
                };
                if better {
                    best = Some((feature, threshold, weighted));
                }
            }
        }

        let Some((feature, threshold, weighted)) = best else {
            return;
        };
        let decrease = node_impurity - weighted;
        if decrease <= 0.0 {
            return;
        }
        importances[feature] += (indices.len() as f64 / n_total) * decrease;

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x[[i, feature]] <= threshold);
        if left.is_empty() || right.is_empty() {
            return;
        }
        self.grow(x, y, left, depth + 1, max_features, n_total, rng, importances);
        self.grow(x, y, right, depth + 1, max_features, n_total, rng, importances);
    }
}

fn gini(y: &[i64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for &i in indices {
        *counts.entry(y[i]).or_insert(0) += 1;
    }
    let n = indices.len() as f64;
    1.0 - counts
        .values()
        .map(|&c| {
            let p = c as f64 / n;
            p * p
        })
        .sum::<f64>()
}

/// Best threshold for one feature: scan the sorted values and evaluate the
/// weighted child Gini at every boundary between distinct values. Returns
/// None when the feature is constant over the node.
fn best_split(x: &Array2<f64>, y: &[i64], indices: &[usize], feature: usize) -> Option<(f64, f64)> {
    let mut sorted: Vec<(f64, i64)> = indices.iter().map(|&i| (x[[i, feature]], y[i])).collect();
    sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len() as f64;
    let mut right_counts: HashMap<i64, usize> = HashMap::new();
    for &(_, label) in &sorted {
        *right_counts.entry(label).or_insert(0) += 1;
    }
    let mut left_counts: HashMap<i64, usize> = HashMap::new();

    let mut best: Option<(f64, f64)> = None;
    for i in 0..sorted.len() - 1 {
        let (value, label) = sorted[i];
        *left_counts.entry(label).or_insert(0) += 1;
        if let Some(count) = right_counts.get_mut(&label) {
            *count -= 1;
        }
        let next_value = sorted[i + 1].0;
        if next_value <= value {
            continue;
        }

        let n_left = (i + 1) as f64;
        let n_right = n - n_left;
        let weighted = (n_left / n) * gini_of(&left_counts, n_left)
            + (n_right / n) * gini_of(&right_counts, n_right);
        let threshold = (value + next_value) / 2.0;
        let better = match best {
            Some((_, w)) => weighted < w,
            None => true,
        };
        if better {
            best = Some((threshold, weighted));
        }
    }
    best
}

fn gini_of(counts: &HashMap<i64, usize>, n: f64) -> f64 {
    if n == 0.0 {
        return 0.0;
    }
    1.0 - counts
        .values()
        .map(|&c| {
            let p = c as f64 / n;
            p * p
        })
        .sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balanced_frame() -> BalancedData {
        // "signal" separates the classes perfectly, "noise" does not.
        let mut signal = Vec::new();
        let mut noise = Vec::new();
        let mut status = Vec::new();
        for i in 0..20 {
            let class = i % 2;
            signal.push(if class == 0 { i as f64 * 0.1 } else { 10.0 + i as f64 * 0.1 });
            // Both classes occur at every noise level.
            noise.push(((i / 2) % 3) as f64);
            status.push(class as i64);
        }
        BalancedData::new(
            df!(
                "noise" => noise,
                "signal" => signal,
                "booking_status" => status,
            )
            .unwrap(),
        )
    }

    #[test]
    fn informative_feature_ranks_first() {
        let (selected, columns) = select_features(&balanced_frame(), 1, "booking_status", 42).unwrap();
        assert_eq!(columns, vec!["signal".to_string(), "booking_status".to_string()]);
        let names: Vec<String> = selected
            .frame()
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names, columns);
    }

    #[test]
    fn selection_is_deterministic_for_a_seed() {
        let (a, cols_a) = select_features(&balanced_frame(), 2, "booking_status", 9).unwrap();
        let (b, cols_b) = select_features(&balanced_frame(), 2, "booking_status", 9).unwrap();
        assert_eq!(cols_a, cols_b);
        assert!(a.frame().equals(b.frame()));
    }

    #[test]
    fn oversized_k_keeps_all_features() {
        let (_, columns) = select_features(&balanced_frame(), 50, "booking_status", 42).unwrap();
        assert_eq!(columns.len(), 3); // 2 features + label
    }

    #[test]
    fn constant_features_fall_back_to_original_order() {
        let data = BalancedData::new(
            df!(
                "a" => &[1.0f64; 8],
                "b" => &[2.0f64; 8],
                "c" => &[3.0f64; 8],
                "booking_status" => &[0i64, 1, 0, 1, 0, 1, 0, 1],
            )
            .unwrap(),
        );
        let (_, columns) = select_features(&data, 2, "booking_status", 42).unwrap();
        assert_eq!(
            columns,
            vec!["a".to_string(), "b".to_string(), "booking_status".to_string()]
        );
    }

    #[test]
    fn apply_selection_projects_exact_columns_in_order() {
        let test = BalancedData::new(
            df!(
                "e" => &[1.0f64, 2.0],
                "signal" => &[0.5f64, 10.5],
                "d" => &[3.0f64, 4.0],
                "booking_status" => &[0i64, 1],
            )
            .unwrap(),
        );
        let columns = vec!["signal".to_string(), "booking_status".to_string()];
        let projected = apply_selection(&test, &columns).unwrap();
        let names: Vec<String> = projected
            .frame()
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names, columns);
    }

    #[test]
    fn apply_selection_fails_on_missing_column() {
        let test = BalancedData::new(
            df!(
                "other" => &[1.0f64],
                "booking_status" => &[0i64],
            )
            .unwrap(),
        );
        let columns = vec!["signal".to_string(), "booking_status".to_string()];
        let err = apply_selection(&test, &columns).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { .. }));
    }
}
