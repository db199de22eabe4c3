//! Disease-risk score trainer
//!
//! One logistic model per replicate, fit on untreated subjects only and
//! scored on the whole replicate. The penalty is chosen per replicate by
//! k-fold cross-validation on the untreated rows, selecting by Matthews
//! correlation, and results are appended across replicates in long
//! format rather than joined wide.

use std::str::FromStr;

use anyhow::{bail, Context, Result};
use linfa::prelude::*;
use linfa::Dataset;
use linfa_logistic::LogisticRegression;
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::grid::{drs_logistic_grid, LogisticParams};
use super::{feature_columns, to_feature_matrix, to_target_labels};
use crate::pipeline::config::{INDEX_ID, INDEX_IMPUTE_ID, TARGET_TREATMENT};
use crate::pipeline::{replicate_frame, replicate_ids};
use crate::report::metrics::ConfusionMatrix;

/// Derived adverse-outcome column added before training.
pub const TARGET_DRS: &str = "target";

/// Raw outcome flags a target definition may draw on. Excluded from the
/// feature set so the model never sees its own target.
pub const OUTCOME_COLUMNS: [&str; 6] = [
    "ed_14d",
    "inpt_14d",
    "death_14d",
    "ed_30d",
    "inpt_30d",
    "death_30d",
];

const DRS_SEED: u64 = 0x5eed_0004;

/// Which outcome flags are OR-ed into the composite target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetDefinition {
    /// inpt_30d | death_30d
    All30d,
    /// ed_14d | inpt_14d | death_14d
    All14d,
    /// One raw outcome flag used directly
    Single(String),
}

impl TargetDefinition {
    /// The raw flag columns this definition reads.
    pub fn source_columns(&self) -> Vec<&str> {
        match self {
            TargetDefinition::All30d => vec!["inpt_30d", "death_30d"],
            TargetDefinition::All14d => vec!["ed_14d", "inpt_14d", "death_14d"],
            TargetDefinition::Single(name) => vec![name.as_str()],
        }
    }
}

impl FromStr for TargetDefinition {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all_30d" => Ok(TargetDefinition::All30d),
            "all_14d" => Ok(TargetDefinition::All14d),
            other if OUTCOME_COLUMNS.contains(&other) => {
                Ok(TargetDefinition::Single(other.to_string()))
            }
            other => Err(format!(
                "Unknown target definition '{}'. Use 'all_30d', 'all_14d' or one of: {}.",
                other,
                OUTCOME_COLUMNS.join(", ")
            )),
        }
    }
}

impl std::fmt::Display for TargetDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetDefinition::All30d => write!(f, "all_30d"),
            TargetDefinition::All14d => write!(f, "all_14d"),
            TargetDefinition::Single(name) => write!(f, "{}", name),
        }
    }
}

/// Add the composite 0/1 target column derived from the raw flags.
pub fn derive_target(df: &DataFrame, definition: &TargetDefinition) -> Result<DataFrame> {
    let sources = definition.source_columns();
    let mut target = vec![0i64; df.height()];
    for name in sources {
        let col = df
            .column(name)
            .with_context(|| format!("Target flag column '{}' missing from input", name))?;
        let cast = col.cast(&DataType::Int64)?;
        for (i, value) in cast.i64()?.into_iter().enumerate() {
            let value = value
                .ok_or_else(|| anyhow::anyhow!("Target flag column '{}' has a missing value", name))?;
            if value == 1 {
                target[i] = 1;
            }
        }
    }
    let mut out = df.clone();
    out.with_column(Column::new(TARGET_DRS.into(), target))?;
    Ok(out)
}

/// Long-format result plus the per-replicate selected penalties.
pub struct DrsOutput {
    /// person_id, impute_id, treatment_group, target, prediction
    pub table: DataFrame,
    /// (replicate id, selected alpha, cross-validated MCC)
    pub selected: Vec<(i64, f64, f64)>,
}

pub fn train_drs(df: &DataFrame, cv_folds: usize) -> Result<DrsOutput> {
    if cv_folds < 2 {
        bail!("Cross-validation requires at least 2 folds");
    }

    let features = drs_feature_columns(df);
    if features.is_empty() {
        bail!("No feature columns available for DRS training");
    }

    let grid = drs_logistic_grid();
    let ids = replicate_ids(df)?;
    if ids.is_empty() {
        bail!("Input table has no imputation replicates");
    }

    let mut out: Option<DataFrame> = None;
    let mut selected = Vec::with_capacity(ids.len());

    for &id in &ids {
        let replicate = replicate_frame(df, id)?;
        let untreated = replicate
            .clone()
            .lazy()
            .filter(col(TARGET_TREATMENT).cast(DataType::Int64).eq(lit(0i64)))
            .collect()?;
        if untreated.height() == 0 {
            bail!("Replicate {} has no untreated subjects to fit on", id);
        }

        let x_train = to_feature_matrix(&untreated, &features)?;
        let y_train = to_target_labels(&untreated, TARGET_DRS)?;
        let x_test = to_feature_matrix(&replicate, &features)?;

        let (params, score) = select_by_cv(&x_train, &y_train, &grid, cv_folds, id)
            .with_context(|| format!("DRS model selection failed on replicate {}", id))?;
        selected.push((id, params.alpha, score));

        let dataset = Dataset::new(x_train, y_train);
        let model = LogisticRegression::default()
            .with_intercept(true)
            .alpha(params.alpha)
            .max_iterations(params.max_iterations)
            .fit(&dataset)
            .map_err(|e| anyhow::anyhow!("DRS fit failed on replicate {}: {}", id, e))?;
        let probs = model.predict_probabilities(&x_test).to_vec();

        let mut frame =
            replicate.select([INDEX_ID, INDEX_IMPUTE_ID, TARGET_TREATMENT, TARGET_DRS])?;
        frame.with_column(Column::new("prediction".into(), probs))?;

        out = Some(match out {
            None => frame,
            Some(mut acc) => {
                acc.vstack_mut(&frame)?;
                acc
            }
        });
    }

    let table = out.context("No replicate result frames were produced")?;
    if table.column("prediction")?.null_count() > 0 {
        bail!("DRS prediction column contains missing values");
    }
    Ok(DrsOutput { table, selected })
}

/// Feature columns for DRS: everything not carried, not a model column,
/// and not part of the target machinery.
pub fn drs_feature_columns(df: &DataFrame) -> Vec<String> {
    feature_columns(df)
        .into_iter()
        .filter(|name| name != TARGET_DRS && !OUTCOME_COLUMNS.contains(&name.as_str()))
        .collect()
}

/// Pick the grid point with the best pooled cross-validated Matthews
/// correlation. A fold where the fit fails (a single-class training
/// split, for instance) simply contributes nothing to that candidate's
/// pool; a candidate with no successful fold at all is skipped.
fn select_by_cv(
    x: &Array2<f64>,
    y: &Array1<i64>,
    grid: &[LogisticParams],
    folds: usize,
    replicate: i64,
) -> Result<(LogisticParams, f64)> {
    let n = x.nrows();
    if n < folds {
        bail!("{} untreated rows cannot be split into {} folds", n, folds);
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(DRS_SEED.wrapping_add(replicate as u64));
    order.shuffle(&mut rng);

    let fold_assignments: Vec<Vec<usize>> = (0..folds)
        .map(|f| order.iter().copied().skip(f).step_by(folds).collect())
        .collect();

    let mut best: Option<(LogisticParams, f64)> = None;

    for params in grid {
        let mut actual = Vec::new();
        let mut probs = Vec::new();

        for holdout in &fold_assignments {
            let train_rows: Vec<usize> =
                order.iter().copied().filter(|r| !holdout.contains(r)).collect();

            let x_fold = x.select(Axis(0), &train_rows);
            let y_fold: Array1<i64> = train_rows.iter().map(|&r| y[r]).collect();
            let dataset = Dataset::new(x_fold, y_fold);

            let model = match LogisticRegression::default()
                .with_intercept(true)
                .alpha(params.alpha)
                .max_iterations(params.max_iterations)
                .fit(&dataset)
            {
                Ok(model) => model,
                Err(_) => continue,
            };

            let x_holdout = x.select(Axis(0), holdout);
            let fold_probs = model.predict_probabilities(&x_holdout);
            actual.extend(holdout.iter().map(|&r| y[r]));
            probs.extend(fold_probs.iter().copied());
        }

        if actual.is_empty() {
            continue;
        }
        let mcc = ConfusionMatrix::from_probabilities(&actual, &probs).matthews();
        if best.map_or(true, |(_, b)| mcc > b) {
            best = Some((*params, mcc));
        }
    }

    best.ok_or_else(|| anyhow::anyhow!("No grid point produced a usable cross-validated fit"))
}
