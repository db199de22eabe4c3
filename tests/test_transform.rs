//! Tests for the per-replicate feature transformer pipeline

mod common;

use common::*;
use polars::prelude::*;
use pscore::pipeline::{format_columns, resolve_configs, Step, TransformPipeline};

fn transformed_cohort(region_baseline: Option<&str>) -> DataFrame {
    let df = cohort_dataframe();
    let columns: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let resolved = resolve_configs(&columns, &schema_dataframe(region_baseline), Step::Ps, &[]).unwrap();
    let formatted = format_columns(&df, &resolved).unwrap();
    let pipeline = TransformPipeline::from_config(&resolved, "health_system");
    pipeline.transform_replicates(&formatted).unwrap()
}

#[test]
fn test_row_count_preserved_across_replicates() {
    let out = transformed_cohort(None);
    assert_eq!(out.height(), 6);
}

#[test]
fn test_categorical_expands_to_one_column_per_category() {
    let out = transformed_cohort(None);
    assert_has_columns(&out, &["region__north-east", "region__south"]);
    assert_missing_columns(&out, &["region"]);

    let north: Vec<f64> = out
        .column("region__north-east")
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .flatten()
        .collect();
    let south: Vec<f64> = out
        .column("region__south")
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .flatten()
        .collect();
    // Indicators are exhaustive and exclusive over two categories.
    for (n, s) in north.iter().zip(&south) {
        assert_eq!(n + s, 1.0);
    }
}

#[test]
fn test_dropped_baseline_leaves_single_dummy() {
    let out = transformed_cohort(Some("north-east"));
    assert_has_columns(&out, &["region__south"]);
    assert_missing_columns(&out, &["region__north-east", "region"]);
}

#[test]
fn test_numeric_scaling_is_per_replicate() {
    let out = transformed_cohort(None);
    let age: Vec<f64> = out
        .column("age")
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .flatten()
        .collect();

    // Each replicate's scaled values sum to zero independently.
    let first: f64 = age[..3].iter().sum();
    let second: f64 = age[3..].iter().sum();
    assert!(first.abs() < 1e-9, "replicate 1 not centered: {}", first);
    assert!(second.abs() < 1e-9, "replicate 2 not centered: {}", second);
}

#[test]
fn test_index_and_target_pass_through_unchanged() {
    let out = transformed_cohort(None);
    assert_has_columns(
        &out,
        &[
            "person_id",
            "impute_id",
            "imputed_demographics",
            "imputed_vitals",
            "treatment_group",
        ],
    );

    let treatment: Vec<i64> = out
        .column("treatment_group")
        .unwrap()
        .cast(&DataType::Int64)
        .unwrap()
        .i64()
        .unwrap()
        .into_iter()
        .flatten()
        .collect();
    assert_eq!(treatment, vec![1, 0, 1, 1, 0, 1]);
}
