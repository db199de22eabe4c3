//! End-to-end tests: format, transform, train, merge on the cohort fixture

mod common;

use common::*;
use polars::prelude::*;
use pscore::model::{
    derive_target, merge_wide_tables, train_boosting, train_drs, train_forest, train_logistic,
    TargetDefinition,
};
use pscore::pipeline::{
    format_columns, load_dataset, resolve_configs, save_csv, Step, TransformPipeline,
};

#[test]
fn test_full_ps_pipeline_on_small_cohort() {
    let df = cohort_dataframe();
    let columns: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let resolved =
        resolve_configs(&columns, &schema_dataframe(Some("north-east")), Step::Ps, &[]).unwrap();
    let formatted = format_columns(&df, &resolved).unwrap();
    let transformed = TransformPipeline::from_config(&resolved, "health_system")
        .transform_replicates(&formatted)
        .unwrap();

    // Two categories with a dropped baseline leave exactly one dummy.
    assert_has_columns(&transformed, &["region__south"]);
    assert_missing_columns(&transformed, &["region__north-east"]);

    let logistic = train_logistic(&transformed).unwrap();
    let forest = train_forest(&transformed).unwrap();
    let boosted = train_boosting(&transformed).unwrap();

    let surviving_lr = 2 - logistic.pruned.len();
    let merged = merge_wide_tables(vec![logistic.table, forest, boosted]).unwrap();

    // 2 replicates x 3 subjects
    assert_eq!(merged.height(), 6);

    let model_columns = merged
        .get_column_names()
        .iter()
        .filter(|name| name.starts_with("model_"))
        .count();
    // One probability column per surviving grid point: LR survivors,
    // 4 forest points, 4 boosting points.
    assert_eq!(model_columns, surviving_lr + 4 + 4);

    for name in merged.get_column_names() {
        if name.starts_with("model_") {
            let col = merged.column(name.as_str()).unwrap();
            assert_eq!(col.null_count(), 0, "nulls in {}", name);
        }
    }
}

#[test]
fn test_full_drs_pipeline_long_output() {
    // Extend the cohort fixture with outcome flags and enough subjects
    // for cross-validation on the untreated rows.
    let n = 30;
    let mut person = Vec::new();
    let mut impute = Vec::new();
    let mut flags = Vec::new();
    let mut treatment = Vec::new();
    let mut age = Vec::new();
    let mut inpt = Vec::new();
    let mut death = Vec::new();
    for replicate in 1..=2i64 {
        for i in 0..n {
            person.push(format!("p{}", i));
            impute.push(replicate);
            flags.push(0i64);
            treatment.push(if i % 5 == 0 { 1i64 } else { 0 });
            let sick = i >= n / 2;
            age.push(if sick { 1.0 } else { -1.0 } + (i % 6) as f64 * 0.1);
            inpt.push(if sick { 1i64 } else { 0 });
            death.push(if i == n - 1 { 1i64 } else { 0 });
        }
    }
    let df = df! {
        "person_id" => person,
        "impute_id" => impute,
        "imputed_demographics" => flags.clone(),
        "imputed_vitals" => flags,
        "treatment_group" => treatment,
        "age" => age,
        "inpt_30d" => inpt,
        "death_30d" => death,
    }
    .unwrap();

    let with_target = derive_target(&df, &TargetDefinition::All30d).unwrap();
    let out = train_drs(&with_target, 5).unwrap();

    // Long format: every subject of every replicate is scored, treated
    // subjects included even though the fit saw only untreated rows.
    assert_eq!(out.table.height(), df.height());
    assert_eq!(out.selected.len(), 2);
    assert_has_columns(
        &out.table,
        &["person_id", "impute_id", "treatment_group", "target", "prediction"],
    );

    let treated_rows = out
        .table
        .clone()
        .lazy()
        .filter(col("treatment_group").eq(lit(1i64)))
        .collect()
        .unwrap();
    assert!(treated_rows.height() > 0);
    assert_eq!(treated_rows.column("prediction").unwrap().null_count(), 0);
}

#[test]
fn test_formatted_frame_round_trips_through_csv() {
    let df = cohort_dataframe();
    let columns: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let resolved = resolve_configs(&columns, &schema_dataframe(None), Step::Ps, &[]).unwrap();
    let mut formatted = format_columns(&df, &resolved).unwrap();

    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("formatted.csv");
    save_csv(&mut formatted, &path).unwrap();

    let reloaded = load_dataset(&path, 100).unwrap();
    assert_eq!(reloaded.height(), formatted.height());
    assert_eq!(reloaded.width(), formatted.width());
}
