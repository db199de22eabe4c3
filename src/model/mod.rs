//! Model training - per-replicate grid trainers for logistic regression,
//! random forests and gradient-boosted trees, plus the wide-table merger
//! and the disease-risk score trainer.

pub mod boosting;
pub mod drs;
pub mod forest;
pub mod grid;
pub mod logistic;
pub mod merge;
pub mod tree;

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;

use crate::pipeline::config::{index_columns, TARGET_TREATMENT};
use crate::pipeline::{replicate_frame, replicate_ids};

pub use boosting::train_boosting;
pub use drs::{derive_target, train_drs, DrsOutput, TargetDefinition, TARGET_DRS};
pub use forest::train_forest;
pub use logistic::{train_logistic, LogisticOutput};
pub use merge::merge_wide_tables;

/// Columns every trainer carries through to its output alongside the
/// model-probability columns.
pub fn carried_columns() -> Vec<&'static str> {
    let mut cols = index_columns();
    cols.push(TARGET_TREATMENT);
    cols
}

/// Feature column names: everything in the transformed frame that is not
/// an index column, the target, or an existing model-probability column.
pub fn feature_columns(df: &DataFrame) -> Vec<String> {
    let carried = carried_columns();
    df.get_column_names()
        .iter()
        .map(|s| s.to_string())
        .filter(|name| !carried.contains(&name.as_str()) && !name.starts_with("model_"))
        .collect()
}

/// Build the design matrix from the named feature columns, cast to f64.
pub fn to_feature_matrix(df: &DataFrame, features: &[String]) -> Result<Array2<f64>> {
    let mut matrix = Array2::<f64>::zeros((df.height(), features.len()));
    for (j, name) in features.iter().enumerate() {
        let col = df
            .column(name)
            .with_context(|| format!("Feature column '{}' missing", name))?;
        let cast = col
            .cast(&DataType::Float64)
            .with_context(|| format!("Feature column '{}' is not numeric", name))?;
        for (i, value) in cast.f64()?.into_iter().enumerate() {
            let value = value
                .ok_or_else(|| anyhow::anyhow!("Feature column '{}' has a missing value", name))?;
            matrix[[i, j]] = value;
        }
    }
    Ok(matrix)
}

/// Binary class labels for the named target column.
pub fn to_target_labels(df: &DataFrame, target: &str) -> Result<Array1<i64>> {
    let col = df
        .column(target)
        .with_context(|| format!("Target column '{}' missing", target))?;
    let cast = col.cast(&DataType::Int64)?;
    let labels: Vec<i64> = cast
        .i64()?
        .into_iter()
        .map(|v| v.ok_or_else(|| anyhow::anyhow!("Target column '{}' has a missing value", target)))
        .collect::<Result<_>>()?;
    Ok(Array1::from(labels))
}

/// Target as 0.0/1.0 for the tree-based trainers.
pub fn to_target_values(df: &DataFrame, target: &str) -> Result<Vec<f64>> {
    Ok(to_target_labels(df, target)?
        .iter()
        .map(|&v| v as f64)
        .collect())
}

/// Per-model, per-replicate predicted probabilities collected during
/// training, before assembly into the wide output table.
pub type PredictionStore = BTreeMap<String, BTreeMap<i64, Vec<f64>>>;

/// Assemble the wide result table: for each replicate in ascending order,
/// the carried index columns plus one probability column per surviving
/// model, stacked by row.
///
/// Every surviving model must have a prediction vector for every
/// replicate with exactly that replicate's row count; anything else is a
/// trainer bug and is fatal.
pub fn assemble_predictions(
    df: &DataFrame,
    surviving: &[String],
    predictions: &PredictionStore,
) -> Result<DataFrame> {
    let ids = replicate_ids(df)?;
    let carried = carried_columns();

    let mut out: Option<DataFrame> = None;
    for id in ids {
        let replicate = replicate_frame(df, id)?;
        let mut frame = replicate.select(carried.iter().copied())?;

        for name in surviving {
            let by_replicate = predictions
                .get(name)
                .ok_or_else(|| anyhow::anyhow!("No predictions recorded for model '{}'", name))?;
            let probs = by_replicate.get(&id).ok_or_else(|| {
                anyhow::anyhow!("Model '{}' has no predictions for replicate {}", name, id)
            })?;
            if probs.len() != frame.height() {
                bail!(
                    "Model '{}' produced {} predictions for replicate {} ({} rows)",
                    name,
                    probs.len(),
                    id,
                    frame.height()
                );
            }
            frame.with_column(Column::new(name.as_str().into(), probs.clone()))?;
        }

        out = Some(match out {
            None => frame,
            Some(mut acc) => {
                acc.vstack_mut(&frame)?;
                acc
            }
        });
    }

    let out = out.ok_or_else(|| anyhow::anyhow!("Input table has no imputation replicates"))?;
    assert_probabilities_complete(&out, surviving)?;
    Ok(out)
}

/// A NaN or null in a probability column means a replicate was silently
/// skipped somewhere; halt rather than write a partial result.
pub fn assert_probabilities_complete(df: &DataFrame, model_columns: &[String]) -> Result<()> {
    for name in model_columns {
        let col = df
            .column(name)
            .with_context(|| format!("Probability column '{}' missing from result", name))?;
        if col.null_count() > 0 {
            bail!("Probability column '{}' contains missing values", name);
        }
        let any_nan = col.f64()?.into_iter().flatten().any(|v| !v.is_finite());
        if any_nan {
            bail!("Probability column '{}' contains non-finite values", name);
        }
    }
    Ok(())
}
