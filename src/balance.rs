use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

use ndarray::Array2;
use polars::prelude::*;
use rand::prelude::*;
use tracing::{error, info};

use crate::dataset::{BalancedData, EncodedData};
use crate::error::{PipelineError, Result};

/// Ordered (distance, index) pair for the k-nearest-neighbor heap.
#[derive(Debug, Clone, Copy)]
struct DistIdx(f64, usize);

impl PartialEq for DistIdx {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

/// Synthetic minority oversampling: every class below the majority count
/// is topped up with records interpolated between existing same-class
/// neighbors, until all classes have equal representation.
///
/// Requires an already-encoded frame (all features numeric), which the
/// `EncodedData` input type enforces at compile time.
#[derive(Debug, Clone)]
pub struct Smote {
    k_neighbors: usize,
    seed: u64,
}

impl Smote {
    pub fn new() -> Self {
        Self {
            k_neighbors: 5,
            seed: 42,
        }
    }

    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Balance the dataset on `label`. Deterministic for a fixed seed:
    /// classes are visited in sorted order and all randomness comes from
    /// one seeded generator.
    pub fn balance(&self, data: EncodedData, label: &str) -> Result<BalancedData> {
        info!("starting data balancing");
        let df = data.into_frame();
        let (x, feature_names) = feature_matrix(&df, label)?;
        let y = label_codes(&df, label)?;

        let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (i, &class) in y.iter().enumerate() {
            by_class.entry(class).or_default().push(i);
        }
        if by_class.len() < 2 {
            return Err(PipelineError::schema(
                "balancing",
                format!("need at least 2 label classes, found {}", by_class.len()),
            ));
        }
        let majority = by_class.values().map(Vec::len).max().unwrap_or(0);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut synthetic_x: Vec<Vec<f64>> = Vec::new();
        let mut synthetic_y: Vec<i64> = Vec::new();

        for (&class, indices) in &by_class {
            let n_to_generate = majority - indices.len();
            if n_to_generate == 0 {
                continue;
            }
            if indices.len() < 2 {
                error!(class, count = indices.len(), "cannot interpolate minority class");
                return Err(PipelineError::InsufficientSamples {
                    class,
                    count: indices.len(),
                });
            }

            let class_samples: Vec<Vec<f64>> = indices
                .iter()
                .map(|&i| x.row(i).iter().copied().collect())
                .collect();
            let k = self.k_neighbors.min(class_samples.len() - 1);

            for _ in 0..n_to_generate {
                let idx = rng.gen_range(0..class_samples.len());
                let sample = &class_samples[idx];
                let neighbors = find_neighbors(sample, idx, &class_samples, k);
                let neighbor = &class_samples[neighbors[rng.gen_range(0..neighbors.len())]];
                let gap: f64 = rng.gen();
                let synthesized: Vec<f64> = sample
                    .iter()
                    .zip(neighbor.iter())
                    .map(|(&p, &n)| p + gap * (n - p))
                    .collect();
                synthetic_x.push(synthesized);
                synthetic_y.push(class);
            }
        }

        info!(
            original = y.len(),
            synthetic = synthetic_y.len(),
            "data balancing completed"
        );

        // Original rows first, synthetic rows appended.
        let mut columns: Vec<Column> = Vec::with_capacity(feature_names.len() + 1);
        for (j, name) in feature_names.iter().enumerate() {
            let mut values: Vec<f64> = x.column(j).iter().copied().collect();
            values.extend(synthetic_x.iter().map(|row| row[j]));
            columns.push(Series::new(name.as_str().into(), values).into_column());
        }
        let mut labels = y;
        labels.extend_from_slice(&synthetic_y);
        columns.push(Series::new(label.into(), labels).into_column());

        Ok(BalancedData::new(DataFrame::new(columns)?))
    }
}

impl Default for Smote {
    fn default() -> Self {
        Self::new()
    }
}

/// All non-label columns as a row-major f64 matrix, with their names in
/// frame order. Shared with feature selection, which consumes the same
/// encoded representation.
pub(crate) fn feature_matrix(df: &DataFrame, label: &str) -> Result<(Array2<f64>, Vec<String>)> {
    let feature_names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .filter(|name| name != label)
        .collect();
    let mut data = Vec::with_capacity(df.height() * feature_names.len());
    let mut per_column: Vec<Vec<f64>> = Vec::with_capacity(feature_names.len());
    for name in &feature_names {
        let col = df.column(name.as_str())?;
        if !crate::preprocessing::is_numeric_dtype(col.dtype()) {
            return Err(PipelineError::schema(
                "balancing",
                format!("feature column '{name}' is not numeric; encode categoricals first"),
            ));
        }
        let casted = col.cast(&DataType::Float64)?;
        let values: Vec<f64> = casted
            .f64()?
            .into_iter()
            .map(|v| {
                v.ok_or_else(|| {
                    PipelineError::schema("balancing", format!("null value in column '{name}'"))
                })
            })
            .collect::<Result<_>>()?;
        per_column.push(values);
    }
    for row in 0..df.height() {
        for col in &per_column {
            data.push(col[row]);
        }
    }
    let x = Array2::from_shape_vec((df.height(), feature_names.len()), data)
        .map_err(|e| PipelineError::schema("balancing", e.to_string()))?;
    Ok((x, feature_names))
}

pub(crate) fn label_codes(df: &DataFrame, label: &str) -> Result<Vec<i64>> {
    let col = df.column(label).map_err(|_| {
        PipelineError::schema("balancing", format!("label column '{label}' not found"))
    })?;
    if !crate::preprocessing::is_numeric_dtype(col.dtype()) {
        return Err(PipelineError::schema(
            "balancing",
            format!("label column '{label}' is not integer-encoded"),
        ));
    }
    let casted = col.cast(&DataType::Int64)?;
    casted
        .i64()?
        .into_iter()
        .map(|v| {
            v.ok_or_else(|| {
                PipelineError::schema("balancing", format!("null label in column '{label}'"))
            })
        })
        .collect()
}

/// K nearest same-class neighbors by Euclidean distance, excluding the
/// sample itself. O(n log k) via a bounded max-heap.
fn find_neighbors(point: &[f64], point_idx: usize, data: &[Vec<f64>], k: usize) -> Vec<usize> {
    let mut heap: BinaryHeap<DistIdx> = BinaryHeap::with_capacity(k + 1);
    for (i, other) in data.iter().enumerate() {
        if i == point_idx {
            continue;
        }
        let dist = point
            .iter()
            .zip(other.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt();
        if heap.len() < k {
            heap.push(DistIdx(dist, i));
        } else if let Some(&DistIdx(max_dist, _)) = heap.peek() {
            if dist < max_dist {
                heap.pop();
                heap.push(DistIdx(dist, i));
            }
        }
    }
    let mut out: Vec<usize> = heap.into_iter().map(|DistIdx(_, i)| i).collect();
    out.sort_unstable();
    out
}
