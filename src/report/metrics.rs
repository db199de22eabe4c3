//! Classification metrics
//!
//! Confusion-matrix counts and the derived scores used to select and
//! report DRS models. Matthews correlation is the selection criterion
//! because it stays informative under the heavy class imbalance of
//! adverse-outcome targets.

use comfy_table::{presets::UTF8_FULL, Cell, Table};

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfusionMatrix {
    pub true_positive: u64,
    pub false_positive: u64,
    pub true_negative: u64,
    pub false_negative: u64,
}

impl ConfusionMatrix {
    /// Tally predictions against actual 0/1 labels.
    pub fn from_labels(actual: &[i64], predicted: &[i64]) -> Self {
        let mut cm = ConfusionMatrix::default();
        for (&a, &p) in actual.iter().zip(predicted) {
            match (a, p) {
                (1, 1) => cm.true_positive += 1,
                (0, 1) => cm.false_positive += 1,
                (0, 0) => cm.true_negative += 1,
                _ => cm.false_negative += 1,
            }
        }
        cm
    }

    /// Threshold probabilities at 0.5 and tally.
    pub fn from_probabilities(actual: &[i64], probabilities: &[f64]) -> Self {
        let predicted: Vec<i64> = probabilities
            .iter()
            .map(|&p| if p >= 0.5 { 1 } else { 0 })
            .collect();
        Self::from_labels(actual, &predicted)
    }

    pub fn total(&self) -> u64 {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    pub fn accuracy(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        (self.true_positive + self.true_negative) as f64 / self.total() as f64
    }

    pub fn precision(&self) -> f64 {
        let denom = self.true_positive + self.false_positive;
        if denom == 0 {
            return 0.0;
        }
        self.true_positive as f64 / denom as f64
    }

    pub fn recall(&self) -> f64 {
        let denom = self.true_positive + self.false_negative;
        if denom == 0 {
            return 0.0;
        }
        self.true_positive as f64 / denom as f64
    }

    /// Matthews correlation coefficient; 0.0 whenever any marginal is
    /// empty (the usual convention for a degenerate matrix).
    pub fn matthews(&self) -> f64 {
        let tp = self.true_positive as f64;
        let fp = self.false_positive as f64;
        let tn = self.true_negative as f64;
        let fn_ = self.false_negative as f64;

        let denom = ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();
        if denom == 0.0 {
            return 0.0;
        }
        (tp * tn - fp * fn_) / denom
    }
}

/// Render one titled metrics table for console output.
pub fn metrics_table(title: &str, cm: &ConfusionMatrix) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new(title),
        Cell::new("Predicted 0"),
        Cell::new("Predicted 1"),
    ]);
    table.add_row(vec![
        Cell::new("Actual 0"),
        Cell::new(cm.true_negative.to_string()),
        Cell::new(cm.false_positive.to_string()),
    ]);
    table.add_row(vec![
        Cell::new("Actual 1"),
        Cell::new(cm.false_negative.to_string()),
        Cell::new(cm.true_positive.to_string()),
    ]);
    table.add_row(vec![
        Cell::new("MCC / Precision / Recall"),
        Cell::new(format!("{:.4}", cm.matthews())),
        Cell::new(format!("{:.4} / {:.4}", cm.precision(), cm.recall())),
    ]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_prediction() {
        let actual = vec![0, 1, 0, 1];
        let cm = ConfusionMatrix::from_labels(&actual, &actual);
        assert_eq!(cm.accuracy(), 1.0);
        assert_eq!(cm.matthews(), 1.0);
        assert_eq!(cm.precision(), 1.0);
        assert_eq!(cm.recall(), 1.0);
    }

    #[test]
    fn test_inverted_prediction() {
        let actual = vec![0, 1, 0, 1];
        let predicted = vec![1, 0, 1, 0];
        let cm = ConfusionMatrix::from_labels(&actual, &predicted);
        assert_eq!(cm.matthews(), -1.0);
    }

    #[test]
    fn test_degenerate_matrix_is_zero() {
        let actual = vec![0, 0, 0];
        let predicted = vec![0, 0, 0];
        let cm = ConfusionMatrix::from_labels(&actual, &predicted);
        assert_eq!(cm.matthews(), 0.0);
        assert_eq!(cm.precision(), 0.0);
    }

    #[test]
    fn test_probability_threshold() {
        let actual = vec![0, 1];
        let cm = ConfusionMatrix::from_probabilities(&actual, &[0.49, 0.5]);
        assert_eq!(cm.true_negative, 1);
        assert_eq!(cm.true_positive, 1);
    }
}
