//! Hyperparameter grids
//!
//! The grids are static; every point is trained in the propensity step
//! (no search), and each point's output column is named after the
//! family and its position in the grid so column names stay stable
//! across runs.

/// Logistic regression: ridge penalty strength and iteration cap.
#[derive(Debug, Clone, Copy)]
pub struct LogisticParams {
    pub alpha: f64,
    pub max_iterations: u64,
}

/// The PS logistic grid. Column names look like `model_lr_0`.
pub fn logistic_grid() -> Vec<(String, LogisticParams)> {
    let alphas = [10.0, 100.0];
    alphas
        .iter()
        .enumerate()
        .map(|(i, &alpha)| {
            (
                format!("model_lr_{}", i),
                LogisticParams {
                    alpha,
                    max_iterations: 500,
                },
            )
        })
        .collect()
}

/// Random forest: tree shape and bagging fraction, crossed with an
/// explicit tree-count list.
#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub max_samples: f64,
}

/// The PS forest grid. Column names look like `model_rf_2_50` where the
/// trailing number is the tree count.
pub fn forest_grid() -> Vec<(String, ForestParams)> {
    let tree_counts = [50usize];
    let mut grid = Vec::new();
    let mut i = 0;
    for &min_samples_leaf in &[1usize, 10] {
        for &max_samples in &[0.5f64, 0.9] {
            for &n_trees in &tree_counts {
                grid.push((
                    format!("model_rf_{}_{}", i, n_trees),
                    ForestParams {
                        n_trees,
                        max_depth: 10,
                        min_samples_leaf,
                        max_samples,
                    },
                ));
            }
            i += 1;
        }
    }
    grid
}

/// Gradient boosting: shrinkage, row subsampling, per-split feature
/// fraction, tree depth, and the early-stopping knobs.
#[derive(Debug, Clone, Copy)]
pub struct BoostingParams {
    pub learning_rate: f64,
    pub subsample: f64,
    pub max_features: f64,
    pub max_depth: usize,
    pub n_estimators: usize,
    pub validation_fraction: f64,
    pub patience: usize,
    pub tolerance: f64,
}

/// The PS boosting grid: a conservative slow-learning block and a
/// faster deeper block. Column names look like `model_gbt_0`.
pub fn boosting_grid() -> Vec<(String, BoostingParams)> {
    let mut points = Vec::new();
    for &subsample in &[0.1f64, 0.5] {
        points.push(BoostingParams {
            learning_rate: 0.01,
            subsample,
            max_features: 0.5,
            max_depth: 3,
            n_estimators: 250,
            validation_fraction: 0.1,
            patience: 25,
            tolerance: 1e-3,
        });
    }
    for &subsample in &[0.5f64, 1.0] {
        points.push(BoostingParams {
            learning_rate: 0.1,
            subsample,
            max_features: 1.0,
            max_depth: 5,
            n_estimators: 250,
            validation_fraction: 0.1,
            patience: 25,
            tolerance: 1e-3,
        });
    }
    points
        .into_iter()
        .enumerate()
        .map(|(i, p)| (format!("model_gbt_{}", i), p))
        .collect()
}

/// DRS logistic search grid, scored by cross-validated Matthews
/// correlation instead of training every point.
pub fn drs_logistic_grid() -> Vec<LogisticParams> {
    [1.0, 10.0, 100.0]
        .iter()
        .map(|&alpha| LogisticParams {
            alpha,
            max_iterations: 500,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_grid_names_are_unique_across_families() {
        let mut names = HashSet::new();
        for (name, _) in logistic_grid() {
            assert!(names.insert(name));
        }
        for (name, _) in forest_grid() {
            assert!(names.insert(name));
        }
        for (name, _) in boosting_grid() {
            assert!(names.insert(name));
        }
    }

    #[test]
    fn test_forest_grid_size() {
        // 2 leaf sizes x 2 bagging fractions x 1 tree count
        assert_eq!(forest_grid().len(), 4);
    }

    #[test]
    fn test_boosting_grid_blocks() {
        let grid = boosting_grid();
        assert_eq!(grid.len(), 4);
        assert_eq!(grid[0].1.learning_rate, 0.01);
        assert_eq!(grid[3].1.learning_rate, 0.1);
    }
}
