//! Wide-table merger
//!
//! Inner-joins the trainers' wide tables on the carried index columns.
//! The join must neither fan out nor drop rows, and no two families may
//! emit the same model column name; either condition halts the run.

use std::collections::HashSet;

use anyhow::{bail, Result};
use polars::prelude::*;

use super::carried_columns;

pub fn merge_wide_tables(tables: Vec<DataFrame>) -> Result<DataFrame> {
    if tables.is_empty() {
        bail!("No result tables to merge");
    }

    let carried = carried_columns();
    let expected_height = tables[0].height();

    let mut seen: HashSet<String> = HashSet::new();
    for table in &tables {
        if table.height() != expected_height {
            bail!(
                "Result tables disagree on row count: {} vs {}",
                table.height(),
                expected_height
            );
        }
        for name in table.get_column_names() {
            if carried.contains(&name.as_str()) {
                continue;
            }
            if !seen.insert(name.to_string()) {
                bail!("Duplicate model column '{}' across result tables", name);
            }
        }
    }

    let keys: Vec<Expr> = carried.iter().map(|c| col(*c)).collect();
    let mut iter = tables.into_iter();
    let mut merged = iter.next().unwrap();
    for table in iter {
        merged = merged
            .lazy()
            .join(
                table.lazy(),
                keys.clone(),
                keys.clone(),
                JoinArgs::new(JoinType::Inner),
            )
            .collect()?;
        if merged.height() != expected_height {
            bail!(
                "Merge changed the row count from {} to {}",
                expected_height,
                merged.height()
            );
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide_table(model: &str, probs: [f64; 2]) -> DataFrame {
        df! {
            "person_id" => ["p1", "p2"],
            "impute_id" => [1i64, 1],
            "imputed_demographics" => [0i64, 0],
            "imputed_vitals" => [0i64, 0],
            "treatment_group" => [1i64, 0],
            model => probs,
        }
        .unwrap()
    }

    #[test]
    fn test_merge_preserves_rows_and_columns() {
        let merged = merge_wide_tables(vec![
            wide_table("model_lr_0", [0.6, 0.4]),
            wide_table("model_rf_0_50", [0.7, 0.3]),
            wide_table("model_gbt_0", [0.8, 0.2]),
        ])
        .unwrap();

        assert_eq!(merged.height(), 2);
        assert!(merged.column("model_lr_0").is_ok());
        assert!(merged.column("model_rf_0_50").is_ok());
        assert!(merged.column("model_gbt_0").is_ok());
    }

    #[test]
    fn test_duplicate_model_column_is_fatal() {
        let result = merge_wide_tables(vec![
            wide_table("model_lr_0", [0.6, 0.4]),
            wide_table("model_lr_0", [0.7, 0.3]),
        ]);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Duplicate model column 'model_lr_0'"));
    }

    #[test]
    fn test_row_count_drift_is_fatal() {
        let mut short = wide_table("model_rf_0_50", [0.7, 0.3]);
        short = short.head(Some(1));
        let result = merge_wide_tables(vec![wide_table("model_lr_0", [0.6, 0.4]), short]);
        assert!(result.is_err());
    }
}
