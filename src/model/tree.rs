//! CART regression tree
//!
//! The shared base learner for the forest and boosting trainers. Splits
//! minimize weighted child variance over sorted feature values; leaves
//! hold the mean of their targets, so a tree fit on 0/1 targets predicts
//! a class fraction directly.

use ndarray::ArrayView2;
use rand::seq::SliceRandom;
use rand::Rng;

/// Shape constraints for one tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Number of features considered at each split; `None` means all.
    pub max_features: Option<usize>,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted tree. Nodes live in one flat vector; index 0 is the root.
#[derive(Debug, Clone)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Fit on the given row subset. `rows` may contain duplicates when
    /// the caller bootstraps.
    pub fn fit(
        x: ArrayView2<f64>,
        y: &[f64],
        rows: &[usize],
        params: TreeParams,
        rng: &mut impl Rng,
    ) -> Self {
        let mut tree = RegressionTree { nodes: Vec::new() };
        tree.grow(x, y, rows, params, 0, rng);
        tree
    }

    fn grow(
        &mut self,
        x: ArrayView2<f64>,
        y: &[f64],
        rows: &[usize],
        params: TreeParams,
        depth: usize,
        rng: &mut impl Rng,
    ) -> usize {
        let mean = mean_of(y, rows);

        if depth >= params.max_depth || rows.len() < 2 * params.min_samples_leaf {
            return self.push(Node::Leaf { value: mean });
        }

        let split = find_best_split(x, y, rows, params, rng);
        let Some((feature, threshold)) = split else {
            return self.push(Node::Leaf { value: mean });
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| x[[r, feature]] <= threshold);

        // Reserve the split slot before recursing so child indices are known.
        let node = self.push(Node::Leaf { value: mean });
        let left = self.grow(x, y, &left_rows, params, depth + 1, rng);
        let right = self.grow(x, y, &right_rows, params, depth + 1, rng);
        self.nodes[node] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        node
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Predict one row.
    pub fn predict_row(&self, x: ArrayView2<f64>, row: usize) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[[row, *feature]] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Predict every row of the matrix.
    pub fn predict(&self, x: ArrayView2<f64>) -> Vec<f64> {
        (0..x.nrows()).map(|row| self.predict_row(x, row)).collect()
    }
}

fn mean_of(y: &[f64], rows: &[usize]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().map(|&r| y[r]).sum::<f64>() / rows.len() as f64
}

/// Scan each candidate feature's sorted values with running sums and
/// return the (feature, threshold) with the largest variance reduction.
/// Thresholds are midpoints between adjacent distinct values; equal
/// adjacent values are never split apart.
fn find_best_split(
    x: ArrayView2<f64>,
    y: &[f64],
    rows: &[usize],
    params: TreeParams,
    rng: &mut impl Rng,
) -> Option<(usize, f64)> {
    let n = rows.len();
    if n < 2 * params.min_samples_leaf {
        return None;
    }

    let total_sum: f64 = rows.iter().map(|&r| y[r]).sum();
    let total_sq: f64 = rows.iter().map(|&r| y[r] * y[r]).sum();
    let parent_sse = total_sq - total_sum * total_sum / n as f64;

    let candidates = candidate_features(x.ncols(), params.max_features, rng);

    let mut best: Option<(usize, f64)> = None;
    let mut best_reduction = 1e-12;

    let mut sorted: Vec<(f64, f64)> = Vec::with_capacity(n);
    for feature in candidates {
        sorted.clear();
        sorted.extend(rows.iter().map(|&r| (x[[r, feature]], y[r])));
        sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut left_sum = 0.0f64;
        let mut left_sq = 0.0f64;

        for i in 0..n - 1 {
            let (value, target) = sorted[i];
            left_sum += target;
            left_sq += target * target;

            let left_count = i + 1;
            let right_count = n - left_count;
            if left_count < params.min_samples_leaf || right_count < params.min_samples_leaf {
                continue;
            }
            if (value - sorted[i + 1].0).abs() < 1e-12 {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let left_sse = left_sq - left_sum * left_sum / left_count as f64;
            let right_sse = right_sq - right_sum * right_sum / right_count as f64;

            let reduction = parent_sse - left_sse - right_sse;
            if reduction > best_reduction {
                best_reduction = reduction;
                best = Some((feature, (value + sorted[i + 1].0) / 2.0));
            }
        }
    }

    best
}

fn candidate_features(
    n_features: usize,
    max_features: Option<usize>,
    rng: &mut impl Rng,
) -> Vec<usize> {
    let mut all: Vec<usize> = (0..n_features).collect();
    match max_features {
        Some(k) if k < n_features => {
            all.shuffle(rng);
            all.truncate(k);
            all
        }
        _ => all,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fit_params() -> TreeParams {
        TreeParams {
            max_depth: 3,
            min_samples_leaf: 1,
            max_features: None,
        }
    }

    #[test]
    fn test_tree_splits_separable_data() {
        // One feature cleanly separating the classes at x = 0.5.
        let x = Array2::from_shape_vec((6, 1), vec![0.0, 0.1, 0.2, 0.8, 0.9, 1.0]).unwrap();
        let y = vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let rows: Vec<usize> = (0..6).collect();
        let mut rng = StdRng::seed_from_u64(7);

        let tree = RegressionTree::fit(x.view(), &y, &rows, fit_params(), &mut rng);
        let preds = tree.predict(x.view());
        assert!(preds[0] < 0.5);
        assert!(preds[5] > 0.5);
    }

    #[test]
    fn test_constant_target_yields_single_leaf() {
        let x = Array2::from_shape_vec((4, 1), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let y = vec![0.5; 4];
        let rows: Vec<usize> = (0..4).collect();
        let mut rng = StdRng::seed_from_u64(7);

        let tree = RegressionTree::fit(x.view(), &y, &rows, fit_params(), &mut rng);
        for pred in tree.predict(x.view()) {
            assert!((pred - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let x = Array2::from_shape_vec((4, 1), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let y = vec![0.0, 0.0, 1.0, 1.0];
        let rows: Vec<usize> = (0..4).collect();
        let mut rng = StdRng::seed_from_u64(7);

        let params = TreeParams {
            max_depth: 5,
            min_samples_leaf: 3,
            max_features: None,
        };
        // 4 rows cannot produce two leaves of 3; the tree must stay a stump.
        let tree = RegressionTree::fit(x.view(), &y, &rows, params, &mut rng);
        let preds = tree.predict(x.view());
        assert!(preds.iter().all(|&p| (p - 0.5).abs() < 1e-12));
    }
}
