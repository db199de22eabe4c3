//! Shared test fixtures: a small multiply-imputed cohort and its
//! variable-handling schema.

#![allow(dead_code)]

use polars::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

/// A 2-replicate, 3-subject cohort exercising every formatter path:
/// - `age`: numeric with one missing value (mean-imputed over the table)
/// - `vaccinated`: Y/N boolean with one missing value and a configured fallback
/// - `region`: categorical with two categories needing normalization
/// - `condition_diabetes_vs`: wildcard-matched binary indicator
/// - `health_system`: stratifier, also one-hot encoded
pub fn cohort_dataframe() -> DataFrame {
    df! {
        "person_id" => ["p1", "p2", "p3", "p1", "p2", "p3"],
        "impute_id" => [1i64, 1, 1, 2, 2, 2],
        "imputed_demographics" => [0i64, 0, 0, 0, 0, 0],
        "imputed_vitals" => [0i64, 1, 0, 0, 0, 0],
        "treatment_group" => [1i64, 0, 1, 1, 0, 1],
        "age" => [Some(40.0f64), Some(50.0), None, Some(42.0), Some(50.0), Some(58.0)],
        "vaccinated" => [Some("Y"), Some("N"), None, Some("Y"), Some("N"), Some("Y")],
        "region" => ["North East", "south", "North East", "North East", "south", "south"],
        "condition_diabetes_vs" => [1i64, 0, 0, 1, 0, 0],
        "health_system" => ["hs-a", "hs-a", "hs-a", "hs-a", "hs-a", "hs-a"],
        "unconfigured_extra" => [9i64, 9, 9, 9, 9, 9],
    }
    .unwrap()
}

/// Mean of the five observed `age` values, for hand-checked imputation.
pub const AGE_TABLE_MEAN: f64 = (40.0 + 50.0 + 42.0 + 50.0 + 58.0) / 5.0;

/// The schema table matching [`cohort_dataframe`], as the all-string
/// frame the loader produces. `region_baseline` controls whether the
/// region column drops a baseline category.
pub fn schema_dataframe(region_baseline: Option<&str>) -> DataFrame {
    let variables = [
        "person_id",
        "impute_id",
        "imputed_demographics",
        "imputed_vitals",
        "treatment_group",
        "age",
        "vaccinated",
        "region",
        r"condition_[\w\d]+_vs",
        "health_system",
        "ghost_variable",
    ];
    let dtypes = [
        "object", "int", "int", "int", "int", "float", "bool", "object", "bool", "object",
        "float",
    ];
    let transformers = [
        "passthrough",
        "passthrough",
        "passthrough",
        "passthrough",
        "passthrough",
        "numeric",
        "passthrough",
        "onehot",
        "passthrough",
        "onehot",
        "numeric",
    ];
    let map_null = ["", "", "", "", "", "", "0", "", "", "", ""];
    let baseline = [
        "",
        "",
        "",
        "",
        "",
        "",
        "",
        region_baseline.unwrap_or(""),
        "",
        "",
        "",
    ];
    let bool_0 = ["", "", "", "", "", "", "N", "", "", "", ""];
    let bool_1 = ["", "", "", "", "", "", "Y", "", "", "", ""];
    let flags = ["1"; 11];

    df! {
        "variable" => variables,
        "dtype" => dtypes,
        "transformer" => transformers,
        "map_null" => map_null,
        "onehot_baseline" => baseline,
        "bool_0" => bool_0,
        "bool_1" => bool_1,
        "ps" => flags,
        "drs" => flags,
    }
    .unwrap()
}

/// Write a DataFrame to a CSV in a fresh temp directory.
pub fn create_temp_csv(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("test_data.csv");

    let mut file = std::fs::File::create(&csv_path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();

    (temp_dir, csv_path)
}

/// Assert that a DataFrame contains specific columns
pub fn assert_has_columns(df: &DataFrame, expected_cols: &[&str]) {
    let actual: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    for col in expected_cols {
        assert!(
            actual.contains(&col.to_string()),
            "Missing expected column: '{}'. Actual columns: {:?}",
            col,
            actual
        );
    }
}

/// Assert that a DataFrame does NOT contain specific columns
pub fn assert_missing_columns(df: &DataFrame, unexpected_cols: &[&str]) {
    let actual: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    for col in unexpected_cols {
        assert!(
            !actual.contains(&col.to_string()),
            "Unexpected column still present: '{}'",
            col
        );
    }
}
