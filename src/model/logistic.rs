//! Logistic-regression PS trainer
//!
//! Trains every grid point on every replicate. A grid point whose fit
//! fails on any replicate (optimizer error, non-finite coefficients or
//! probabilities) is pruned from all replicates and its column is absent
//! from the output entirely, never NaN-filled.

use std::collections::BTreeSet;

use anyhow::{bail, Result};
use linfa::prelude::*;
use linfa::Dataset;
use linfa_logistic::LogisticRegression;
use ndarray::{Array1, Array2};
use polars::prelude::*;

use super::grid::{logistic_grid, LogisticParams};
use super::{
    assemble_predictions, feature_columns, to_feature_matrix, to_target_labels, PredictionStore,
};
use crate::pipeline::config::TARGET_TREATMENT;
use crate::pipeline::{replicate_frame, replicate_ids};

/// Wide result table plus the models pruned along the way.
pub struct LogisticOutput {
    pub table: DataFrame,
    /// (model name, failure reason) for every pruned grid point
    pub pruned: Vec<(String, String)>,
}

pub fn train_logistic(df: &DataFrame) -> Result<LogisticOutput> {
    train_logistic_with_grid(df, &logistic_grid())
}

pub fn train_logistic_with_grid(
    df: &DataFrame,
    grid: &[(String, LogisticParams)],
) -> Result<LogisticOutput> {
    let features = feature_columns(df);
    if features.is_empty() {
        bail!("No feature columns available for logistic training");
    }

    let ids = replicate_ids(df)?;
    let mut store: PredictionStore = PredictionStore::new();
    let mut failed: BTreeSet<String> = BTreeSet::new();
    let mut pruned: Vec<(String, String)> = Vec::new();

    for &id in &ids {
        let replicate = replicate_frame(df, id)?;
        let x = to_feature_matrix(&replicate, &features)?;
        let y = to_target_labels(&replicate, TARGET_TREATMENT)?;

        for (name, params) in grid {
            if failed.contains(name) {
                continue;
            }
            match fit_one(&x, &y, params) {
                Ok(probs) => {
                    store.entry(name.clone()).or_default().insert(id, probs);
                }
                Err(reason) => {
                    failed.insert(name.clone());
                    pruned.push((name.clone(), format!("replicate {}: {}", id, reason)));
                }
            }
        }
    }

    let surviving: Vec<String> = grid
        .iter()
        .map(|(name, _)| name.clone())
        .filter(|name| !failed.contains(name))
        .collect();
    if surviving.is_empty() {
        bail!("Every logistic grid point failed to fit; nothing to report");
    }

    let table = assemble_predictions(df, &surviving, &store)?;
    Ok(LogisticOutput { table, pruned })
}

/// Fit one grid point on one replicate. Any failure path returns a
/// reason string; the caller turns that into a permanent prune.
fn fit_one(
    x: &Array2<f64>,
    y: &Array1<i64>,
    params: &LogisticParams,
) -> std::result::Result<Vec<f64>, String> {
    let dataset = Dataset::new(x.clone(), y.clone());
    let model = LogisticRegression::default()
        .with_intercept(true)
        .alpha(params.alpha)
        .max_iterations(params.max_iterations)
        .fit(&dataset)
        .map_err(|e| e.to_string())?;

    if !model.intercept().is_finite() || model.params().iter().any(|p| !p.is_finite()) {
        return Err("optimizer produced non-finite coefficients".to_string());
    }

    let probs = model.predict_probabilities(x);
    if probs.iter().any(|p| !p.is_finite()) {
        return Err("non-finite predicted probabilities".to_string());
    }
    Ok(probs.to_vec())
}
