//! Gradient-boosted trees
//!
//! Logistic-loss boosting over the shared regression tree: the score
//! starts at the log-odds of the training base rate, each round fits a
//! shallow tree to the current residuals on a row subsample and adds its
//! shrunk prediction. A held-out validation slice drives early stopping;
//! when the slice would be empty the run simply uses every round.

use anyhow::{bail, Result};
use ndarray::ArrayView2;
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::grid::{boosting_grid, BoostingParams};
use super::tree::{RegressionTree, TreeParams};
use super::{
    assemble_predictions, feature_columns, to_feature_matrix, to_target_values, PredictionStore,
};
use crate::pipeline::config::TARGET_TREATMENT;
use crate::pipeline::{replicate_frame, replicate_ids};

const BOOSTING_SEED: u64 = 0x5eed_0003;

/// Train the full boosting grid per replicate. Like the forest, every
/// grid point always produces a column.
pub fn train_boosting(df: &DataFrame) -> Result<DataFrame> {
    let grid = boosting_grid();
    let features = feature_columns(df);
    if features.is_empty() {
        bail!("No feature columns available for boosting training");
    }

    let ids = replicate_ids(df)?;
    let mut store: PredictionStore = PredictionStore::new();

    for &id in &ids {
        let replicate = replicate_frame(df, id)?;
        let x = to_feature_matrix(&replicate, &features)?;
        let y = to_target_values(&replicate, TARGET_TREATMENT)?;

        for (point, (name, params)) in grid.iter().enumerate() {
            let seed = BOOSTING_SEED
                .wrapping_add((point as u64) << 16)
                .wrapping_add(id as u64);
            let model = GradientBoosting::fit(x.view(), &y, *params, seed);
            store
                .entry(name.clone())
                .or_default()
                .insert(id, model.predict_proba(x.view()));
        }
    }

    let names: Vec<String> = grid.into_iter().map(|(name, _)| name).collect();
    assemble_predictions(df, &names, &store)
}

#[derive(Debug, Clone)]
pub struct GradientBoosting {
    base_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoosting {
    pub fn fit(x: ArrayView2<f64>, y: &[f64], params: BoostingParams, seed: u64) -> Self {
        let n = x.nrows();
        let mut rng = StdRng::seed_from_u64(seed);

        // Shuffled split into a training and a validation slice.
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut rng);
        let n_val = ((n as f64) * params.validation_fraction).floor() as usize;
        let (val_rows, train_rows) = order.split_at(n_val);

        let base_rate = clamp_rate(mean_of(y, train_rows));
        let base_score = (base_rate / (1.0 - base_rate)).ln();

        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_leaf: 1,
            max_features: Some(feature_count(x.ncols(), params.max_features)),
        };
        let subsample_size = ((train_rows.len() as f64) * params.subsample)
            .ceil()
            .max(1.0) as usize;

        let mut scores = vec![base_score; n];
        let mut trees: Vec<RegressionTree> = Vec::new();
        let mut best_val_loss = f64::INFINITY;
        let mut best_len = 0usize;
        let mut rounds_since_best = 0usize;

        let mut residuals = vec![0.0f64; n];
        let mut shuffled = train_rows.to_vec();

        for _round in 0..params.n_estimators {
            for (i, &score) in scores.iter().enumerate() {
                residuals[i] = y[i] - sigmoid(score);
            }

            shuffled.shuffle(&mut rng);
            let sample = &shuffled[..subsample_size.min(shuffled.len())];

            let tree = RegressionTree::fit(x, &residuals, sample, tree_params, &mut rng);
            for (i, score) in scores.iter_mut().enumerate() {
                *score += params.learning_rate * tree.predict_row(x, i);
            }
            trees.push(tree);

            if val_rows.is_empty() {
                best_len = trees.len();
                continue;
            }

            let val_loss = log_loss(y, &scores, val_rows);
            if val_loss < best_val_loss - params.tolerance {
                best_val_loss = val_loss;
                best_len = trees.len();
                rounds_since_best = 0;
            } else {
                rounds_since_best += 1;
                if rounds_since_best >= params.patience {
                    break;
                }
            }
        }

        trees.truncate(best_len.max(1));

        GradientBoosting {
            base_score,
            learning_rate: params.learning_rate,
            trees,
        }
    }

    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Vec<f64> {
        let mut scores = vec![self.base_score; x.nrows()];
        for tree in &self.trees {
            for (row, score) in scores.iter_mut().enumerate() {
                *score += self.learning_rate * tree.predict_row(x, row);
            }
        }
        scores.into_iter().map(sigmoid).collect()
    }
}

fn sigmoid(score: f64) -> f64 {
    1.0 / (1.0 + (-score).exp())
}

fn mean_of(y: &[f64], rows: &[usize]) -> f64 {
    if rows.is_empty() {
        return 0.5;
    }
    rows.iter().map(|&r| y[r]).sum::<f64>() / rows.len() as f64
}

/// Keep the base rate away from 0 and 1 so the initial log-odds is finite.
fn clamp_rate(rate: f64) -> f64 {
    rate.clamp(1e-6, 1.0 - 1e-6)
}

fn feature_count(n_features: usize, fraction: f64) -> usize {
    (((n_features as f64) * fraction).round() as usize).clamp(1, n_features)
}

fn log_loss(y: &[f64], scores: &[f64], rows: &[usize]) -> f64 {
    let mut loss = 0.0;
    for &r in rows {
        let p = sigmoid(scores[r]).clamp(1e-12, 1.0 - 1e-12);
        loss -= y[r] * p.ln() + (1.0 - y[r]) * (1.0 - p).ln();
    }
    loss / rows.len() as f64
}
