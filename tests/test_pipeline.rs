//! End-to-end test of the processing stage: clean, encode, balance,
//! select on train, project test onto the train columns, persist.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use booking_pipeline::dataset::load_data;
use booking_pipeline::{Config, DataPreprocessor};

fn write_config(dir: &Path) -> Config {
    let path = dir.join("config.yaml");
    fs::write(
        &path,
        r#"
data_ingestion:
  bucket_name: bucket
  bucket_file_name: bookings.csv
  train_ratio: 0.8
data_processing:
  categorical_features: [type_of_meal, booking_status]
  numerical_features: [lead_time, avg_price]
  skew_threshold: 0.5
  no_of_features_to_select: 2
"#,
    )
    .unwrap();
    Config::load(&path).unwrap()
}

fn write_split(path: &Path, rows: usize, minority_every: usize) {
    let meals = ["Meal Plan 1", "Meal Plan 2", "Not Selected"];
    let mut csv = String::from("Booking_ID,type_of_meal,lead_time,avg_price,booking_status\n");
    for i in 0..rows {
        let status = if i % minority_every == 0 {
            "Canceled"
        } else {
            "Not_Canceled"
        };
        csv.push_str(&format!(
            "B{i:04},{},{},{:.2},{status}\n",
            meals[i % meals.len()],
            i + 1,
            40.0 + (i as f64) * 1.5,
        ));
    }
    fs::write(path, csv).unwrap();
}

#[test]
fn process_produces_identical_train_and_test_schemas() {
    let dir = tempfile::tempdir().unwrap();
    let train = dir.path().join("train.csv");
    let test = dir.path().join("test.csv");
    write_split(&train, 30, 3);
    write_split(&test, 12, 4);

    let config = write_config(dir.path());
    let preprocessor =
        DataPreprocessor::new(&train, &test, &dir.path().join("processed"), &config).unwrap();
    preprocessor.process().unwrap();

    let processed_train = load_data(preprocessor.processed_train_path()).unwrap();
    let processed_test = load_data(preprocessor.processed_test_path()).unwrap();

    let train_cols: Vec<String> = processed_train
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let test_cols: Vec<String> = processed_test
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    // 2 selected features + the label, identical on both sides.
    assert_eq!(train_cols.len(), 3);
    assert_eq!(train_cols, test_cols);
    assert_eq!(train_cols.last().map(String::as_str), Some("booking_status"));
}

#[test]
fn process_balances_the_training_classes() {
    let dir = tempfile::tempdir().unwrap();
    let train = dir.path().join("train.csv");
    let test = dir.path().join("test.csv");
    write_split(&train, 30, 3);
    write_split(&test, 12, 4);

    let config = write_config(dir.path());
    let preprocessor =
        DataPreprocessor::new(&train, &test, &dir.path().join("processed"), &config).unwrap();
    preprocessor.process().unwrap();

    let processed_train = load_data(preprocessor.processed_train_path()).unwrap();
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for v in processed_train
        .column("booking_status")
        .unwrap()
        .i64()
        .unwrap()
        .into_iter()
        .flatten()
    {
        *counts.entry(v).or_insert(0) += 1;
    }
    assert_eq!(counts.len(), 2);
    let mut values = counts.values();
    let first = values.next().unwrap();
    assert!(values.all(|c| c == first), "class counts differ: {counts:?}");
}

#[test]
fn process_is_deterministic_across_runs() {
    let mut hashes = Vec::new();
    for _ in 0..2 {
        let dir = tempfile::tempdir().unwrap();
        let train = dir.path().join("train.csv");
        let test = dir.path().join("test.csv");
        write_split(&train, 30, 3);
        write_split(&test, 12, 4);

        let config = write_config(dir.path());
        let preprocessor =
            DataPreprocessor::new(&train, &test, &dir.path().join("processed"), &config).unwrap();
        preprocessor.process().unwrap();
        hashes.push(fs::read_to_string(preprocessor.processed_train_path()).unwrap());
    }
    assert_eq!(hashes[0], hashes[1]);
}
