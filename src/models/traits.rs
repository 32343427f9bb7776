use std::path::Path;

use gbdt::decision_tree::{Data, DataVec};
use polars::prelude::*;

use crate::error::{PipelineError, Result};

/// Contract for the black-box classifier: the pipeline only fits,
/// predicts, and saves; everything else is the library's business.
pub trait Classifier {
    fn fit(&mut self, features: &DataFrame, labels: &[i64]) -> Result<()>;
    fn predict(&self, features: &DataFrame) -> Result<Vec<i64>>;
    fn save(&self, path: &Path) -> Result<()>;
}

/// Convert a frame of numeric columns into the row-major f32 `DataVec`
/// the gbdt crate consumes. Targets default to 0 and are filled in by the
/// caller when training.
pub fn to_data_vec(features: &DataFrame) -> Result<DataVec> {
    let mut columns: Vec<Vec<f32>> = Vec::with_capacity(features.width());
    for col in features.get_columns() {
        if !crate::preprocessing::is_numeric_dtype(col.dtype()) {
            return Err(PipelineError::schema(
                "model input",
                format!("column '{}' is not numeric", col.name()),
            ));
        }
        let casted = col.cast(&DataType::Float64)?;
        let values: Vec<f32> = casted
            .f64()?
            .into_iter()
            .map(|v| v.unwrap_or(0.0) as f32)
            .collect();
        columns.push(values);
    }

    let mut data_vec = DataVec::with_capacity(features.height());
    for row_idx in 0..features.height() {
        let row: Vec<f32> = columns.iter().map(|c| c[row_idx]).collect();
        data_vec.push(Data::new_training_data(row, 1.0, 0.0, None));
    }
    Ok(data_vec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_mixed_numeric_frame_row_major() {
        let df = df!(
            "a" => &[1i64, 2],
            "b" => &[0.5f64, 1.5],
        )
        .unwrap();
        let data = to_data_vec(&df).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].feature, vec![1.0, 0.5]);
        assert_eq!(data[1].feature, vec![2.0, 1.5]);
    }

    #[test]
    fn rejects_string_columns() {
        let df = df!("a" => &["x", "y"]).unwrap();
        assert!(to_data_vec(&df).is_err());
    }
}
