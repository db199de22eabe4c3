//! Calibration-curve export
//!
//! Bins each replicate's DRS predictions into equal-width probability
//! bins and writes mean-predicted versus observed-rate points as JSON,
//! one curve per replicate, for downstream plotting.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use polars::prelude::*;
use serde::Serialize;

use crate::model::TARGET_DRS;
use crate::pipeline::{replicate_frame, replicate_ids};

const CALIBRATION_BINS: usize = 10;

/// Metadata about the scoring run
#[derive(Serialize)]
pub struct CalibrationMetadata {
    /// Timestamp of the run (ISO 8601 format)
    pub timestamp: String,
    /// Pscore version
    pub pscore_version: String,
    /// Target definition the curves describe
    pub target_definition: String,
    /// Number of probability bins per curve
    pub bins: usize,
}

/// One binned point on a curve
#[derive(Serialize, Debug, PartialEq)]
pub struct CalibrationPoint {
    /// Mean predicted probability within the bin
    pub mean_predicted: f64,
    /// Observed event rate within the bin
    pub observed_rate: f64,
    /// Number of subjects in the bin
    pub count: usize,
}

/// One replicate's curve
#[derive(Serialize)]
pub struct CalibrationCurve {
    pub impute_id: i64,
    pub points: Vec<CalibrationPoint>,
}

#[derive(Serialize)]
pub struct CalibrationExport {
    pub metadata: CalibrationMetadata,
    pub curves: Vec<CalibrationCurve>,
}

/// Build one curve per replicate from the long DRS result table and
/// write the export as pretty-printed JSON.
pub fn save_calibration_curves(
    table: &DataFrame,
    target_definition: &str,
    path: &Path,
) -> Result<()> {
    let mut curves = Vec::new();
    for id in replicate_ids(table)? {
        let replicate = replicate_frame(table, id)?;
        let predictions = numeric_column(&replicate, "prediction")?;
        let targets = numeric_column(&replicate, TARGET_DRS)?;
        curves.push(CalibrationCurve {
            impute_id: id,
            points: bin_curve(&predictions, &targets),
        });
    }

    let export = CalibrationExport {
        metadata: CalibrationMetadata {
            timestamp: Utc::now().to_rfc3339(),
            pscore_version: env!("CARGO_PKG_VERSION").to_string(),
            target_definition: target_definition.to_string(),
            bins: CALIBRATION_BINS,
        },
        curves,
    };

    let json = serde_json::to_string_pretty(&export).context("Failed to serialize calibration curves")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write calibration file: {}", path.display()))?;
    Ok(())
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let col = df
        .column(name)
        .with_context(|| format!("Column '{}' missing from DRS result", name))?;
    Ok(col.cast(&DataType::Float64)?.f64()?.into_iter().flatten().collect())
}

/// Equal-width bins over [0, 1]; empty bins are dropped.
fn bin_curve(predictions: &[f64], targets: &[f64]) -> Vec<CalibrationPoint> {
    let mut sums = vec![(0.0f64, 0.0f64, 0usize); CALIBRATION_BINS];
    for (&p, &t) in predictions.iter().zip(targets) {
        let bin = ((p * CALIBRATION_BINS as f64) as usize).min(CALIBRATION_BINS - 1);
        sums[bin].0 += p;
        sums[bin].1 += t;
        sums[bin].2 += 1;
    }
    sums.into_iter()
        .filter(|&(_, _, count)| count > 0)
        .map(|(pred_sum, target_sum, count)| CalibrationPoint {
            mean_predicted: pred_sum / count as f64,
            observed_rate: target_sum / count as f64,
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::INDEX_IMPUTE_ID;
    use tempfile::tempdir;

    #[test]
    fn test_bin_curve_groups_by_probability() {
        let predictions = vec![0.05, 0.08, 0.95, 0.92];
        let targets = vec![0.0, 0.0, 1.0, 1.0];
        let points = bin_curve(&predictions, &targets);

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].count, 2);
        assert_eq!(points[0].observed_rate, 0.0);
        assert_eq!(points[1].observed_rate, 1.0);
    }

    #[test]
    fn test_probability_of_one_lands_in_last_bin() {
        let points = bin_curve(&[1.0], &[1.0]);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].count, 1);
    }

    #[test]
    fn test_save_writes_one_curve_per_replicate() {
        let table = df! {
            "person_id" => ["p1", "p2", "p1", "p2"],
            INDEX_IMPUTE_ID => [1i64, 1, 2, 2],
            "treatment_group" => [1i64, 0, 1, 0],
            TARGET_DRS => [1i64, 0, 1, 0],
            "prediction" => [0.9f64, 0.1, 0.8, 0.2],
        }
        .unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("calibration.json");
        save_calibration_curves(&table, "all_30d", &path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["curves"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["metadata"]["target_definition"], "all_30d");
    }
}
