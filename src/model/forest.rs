//! Random forest classifier
//!
//! Bagged regression trees over a 0/1 target. Each tree sees a bootstrap
//! sample of `max_samples * n` rows and sqrt(n_features) candidate
//! features per split; the forest probability is the mean of the tree
//! leaf fractions. Tree fits are independent, so they run on the rayon
//! pool with per-tree seeded generators to keep output deterministic.

use anyhow::{bail, Result};
use ndarray::ArrayView2;
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::grid::{forest_grid, ForestParams};
use super::tree::{RegressionTree, TreeParams};
use super::{
    assemble_predictions, feature_columns, to_feature_matrix, to_target_values, PredictionStore,
};
use crate::pipeline::config::TARGET_TREATMENT;
use crate::pipeline::{replicate_frame, replicate_ids};

const FOREST_SEED: u64 = 0x5eed_0002;

/// Train the full forest grid per replicate. Forests have no
/// convergence concept, so every grid point appears in the output.
pub fn train_forest(df: &DataFrame) -> Result<DataFrame> {
    let grid = forest_grid();
    let features = feature_columns(df);
    if features.is_empty() {
        bail!("No feature columns available for forest training");
    }

    let ids = replicate_ids(df)?;
    let mut store: PredictionStore = PredictionStore::new();

    for &id in &ids {
        let replicate = replicate_frame(df, id)?;
        let x = to_feature_matrix(&replicate, &features)?;
        let y = to_target_values(&replicate, TARGET_TREATMENT)?;

        for (point, (name, params)) in grid.iter().enumerate() {
            let seed = FOREST_SEED
                .wrapping_add((point as u64) << 16)
                .wrapping_add(id as u64);
            let forest = RandomForest::fit(x.view(), &y, *params, seed);
            store
                .entry(name.clone())
                .or_default()
                .insert(id, forest.predict_proba(x.view()));
        }
    }

    let names: Vec<String> = grid.into_iter().map(|(name, _)| name).collect();
    assemble_predictions(df, &names, &store)
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn fit(x: ArrayView2<f64>, y: &[f64], params: ForestParams, seed: u64) -> Self {
        let n = x.nrows();
        let sample_size = ((n as f64) * params.max_samples).ceil().max(1.0) as usize;
        let max_features = Some(sqrt_features(x.ncols()));

        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_leaf: params.min_samples_leaf,
            max_features,
        };

        let trees = (0..params.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
                let rows: Vec<usize> = (0..sample_size).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(x, y, &rows, tree_params, &mut rng)
            })
            .collect();

        RandomForest { trees }
    }

    /// Mean leaf fraction across trees, one probability per row.
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Vec<f64> {
        let mut probs = vec![0.0f64; x.nrows()];
        for tree in &self.trees {
            for (p, pred) in probs.iter_mut().zip(tree.predict(x)) {
                *p += pred;
            }
        }
        let n_trees = self.trees.len() as f64;
        for p in &mut probs {
            *p /= n_trees;
        }
        probs
    }
}

fn sqrt_features(n_features: usize) -> usize {
    ((n_features as f64).sqrt().floor() as usize).max(1)
}
