//! Per-replicate feature transformation
//!
//! A composable set of column-group transforms (passthrough, global numeric
//! standardization, per-stratum standardization, one-hot with or without a
//! dropped baseline) fit independently on each imputation replicate's rows
//! and applied to those same rows. Fitted state never crosses a replicate
//! boundary.

use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Context, Result};
use polars::prelude::*;
use thiserror::Error;

use super::config::{ResolvedConfig, TransformerKind, INDEX_IMPUTE_ID};
use super::format::column_to_string_vec;

/// Separator between an original column name and an expanded category.
/// Distinct from the intra-name '-' separator so coefficients can be
/// reverse-mapped to variables unambiguously.
pub const FEATURE_SEP: &str = "__";

/// Structured transformer failures
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Column '{column}': stratum '{stratum}' was not seen during fit")]
    UnseenStratum { column: String, stratum: String },

    #[error("Column '{column}': category '{category}' was not seen during fit")]
    UnseenCategory { column: String, category: String },

    #[error("Column '{column}': baseline category '{baseline}' is absent from the fitted vocabulary")]
    MissingBaseline { column: String, baseline: String },

    #[error("Stratifier column '{column}' is required but missing")]
    MissingStratifier { column: String },
}

/// One column-group transform, before fitting
#[derive(Debug, Clone)]
pub enum ColumnTransform {
    /// Identity on the named columns (index and target columns)
    Passthrough { columns: Vec<String> },
    /// Center/scale each column using replicate-level mean and std
    NumericGlobal { columns: Vec<String> },
    /// Center/scale each column within each stratum of `stratifier`
    NumericStratified {
        columns: Vec<String>,
        stratifier: String,
    },
    /// Expand each column into one indicator per category
    OneHot { columns: Vec<String> },
    /// Expand with one configured reference category omitted per column
    OneHotDropBaseline { columns: Vec<(String, String)> },
}

/// The per-replicate fitted state of one column group
#[derive(Debug, Clone)]
pub enum FittedColumnTransform {
    Passthrough {
        columns: Vec<String>,
    },
    NumericGlobal {
        /// (column, mean, std) per column; zero std is stored as 1.0
        stats: Vec<(String, f64, f64)>,
    },
    NumericStratified {
        stratifier: String,
        columns: Vec<String>,
        /// stratum value -> per-column (mean, std), aligned with `columns`
        stats: HashMap<String, Vec<(f64, f64)>>,
    },
    OneHot {
        /// (column, sorted category vocabulary) per column
        vocab: Vec<(String, Vec<String>)>,
    },
    OneHotDropBaseline {
        /// (column, baseline, sorted vocabulary minus the baseline)
        vocab: Vec<(String, String, Vec<String>)>,
    },
}

impl ColumnTransform {
    /// Fit this transform on one replicate's rows.
    pub fn fit(&self, df: &DataFrame) -> Result<FittedColumnTransform> {
        match self {
            ColumnTransform::Passthrough { columns } => Ok(FittedColumnTransform::Passthrough {
                columns: columns.clone(),
            }),
            ColumnTransform::NumericGlobal { columns } => {
                let mut stats = Vec::with_capacity(columns.len());
                for name in columns {
                    let values = numeric_values(df, name)?;
                    let (mean, std) = mean_std(&values);
                    stats.push((name.clone(), mean, std));
                }
                Ok(FittedColumnTransform::NumericGlobal { stats })
            }
            ColumnTransform::NumericStratified {
                columns,
                stratifier,
            } => {
                if df.column(stratifier).is_err() {
                    return Err(TransformError::MissingStratifier {
                        column: stratifier.clone(),
                    }
                    .into());
                }
                let strata = stratum_values(df, stratifier)?;

                // Accumulate per-stratum value lists per column.
                let mut grouped: HashMap<String, Vec<Vec<f64>>> = HashMap::new();
                let column_values: Vec<Vec<f64>> = columns
                    .iter()
                    .map(|name| numeric_values(df, name))
                    .collect::<Result<_>>()?;

                for (row, stratum) in strata.iter().enumerate() {
                    let entry = grouped
                        .entry(stratum.clone())
                        .or_insert_with(|| vec![Vec::new(); columns.len()]);
                    for (c, values) in column_values.iter().enumerate() {
                        entry[c].push(values[row]);
                    }
                }

                let stats = grouped
                    .into_iter()
                    .map(|(stratum, per_column)| {
                        (stratum, per_column.iter().map(|v| mean_std(v)).collect())
                    })
                    .collect();

                Ok(FittedColumnTransform::NumericStratified {
                    stratifier: stratifier.clone(),
                    columns: columns.clone(),
                    stats,
                })
            }
            ColumnTransform::OneHot { columns } => {
                let vocab = columns
                    .iter()
                    .map(|name| Ok((name.clone(), category_vocabulary(df, name)?)))
                    .collect::<Result<_>>()?;
                Ok(FittedColumnTransform::OneHot { vocab })
            }
            ColumnTransform::OneHotDropBaseline { columns } => {
                let mut vocab = Vec::with_capacity(columns.len());
                for (name, baseline) in columns {
                    let full = category_vocabulary(df, name)?;
                    if !full.contains(baseline) {
                        return Err(TransformError::MissingBaseline {
                            column: name.clone(),
                            baseline: baseline.clone(),
                        }
                        .into());
                    }
                    let kept: Vec<String> =
                        full.into_iter().filter(|c| c != baseline).collect();
                    vocab.push((name.clone(), baseline.clone(), kept));
                }
                Ok(FittedColumnTransform::OneHotDropBaseline { vocab })
            }
        }
    }
}

impl FittedColumnTransform {
    /// Names of the columns this transform emits, in output order.
    pub fn feature_names(&self) -> Vec<String> {
        match self {
            FittedColumnTransform::Passthrough { columns } => columns.clone(),
            FittedColumnTransform::NumericGlobal { stats } => {
                stats.iter().map(|(name, _, _)| name.clone()).collect()
            }
            FittedColumnTransform::NumericStratified { columns, .. } => columns.clone(),
            FittedColumnTransform::OneHot { vocab } => vocab
                .iter()
                .flat_map(|(name, categories)| {
                    categories
                        .iter()
                        .map(move |c| format!("{}{}{}", name, FEATURE_SEP, c))
                })
                .collect(),
            FittedColumnTransform::OneHotDropBaseline { vocab } => vocab
                .iter()
                .flat_map(|(name, _, categories)| {
                    categories
                        .iter()
                        .map(move |c| format!("{}{}{}", name, FEATURE_SEP, c))
                })
                .collect(),
        }
    }

    /// Apply the fitted state to one replicate's rows.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        match self {
            FittedColumnTransform::Passthrough { columns } => {
                let out = df
                    .select(columns.iter().map(|s| s.as_str()))
                    .context("Passthrough columns missing from input")?;
                Ok(out)
            }
            FittedColumnTransform::NumericGlobal { stats } => {
                let mut out = Vec::with_capacity(stats.len());
                for (name, mean, std) in stats {
                    let values = numeric_values(df, name)?;
                    let scaled: Vec<f64> = values.iter().map(|v| (v - mean) / std).collect();
                    out.push(Column::new(name.as_str().into(), scaled));
                }
                Ok(DataFrame::new(out)?)
            }
            FittedColumnTransform::NumericStratified {
                stratifier,
                columns,
                stats,
            } => {
                let strata = stratum_values(df, stratifier)?;
                let column_values: Vec<Vec<f64>> = columns
                    .iter()
                    .map(|name| numeric_values(df, name))
                    .collect::<Result<_>>()?;

                let mut scaled: Vec<Vec<f64>> = vec![Vec::with_capacity(df.height()); columns.len()];
                for (row, stratum) in strata.iter().enumerate() {
                    let per_column = stats.get(stratum).ok_or_else(|| TransformError::UnseenStratum {
                        column: stratifier.clone(),
                        stratum: stratum.clone(),
                    })?;
                    for (c, values) in column_values.iter().enumerate() {
                        let (mean, std) = per_column[c];
                        scaled[c].push((values[row] - mean) / std);
                    }
                }

                let out: Vec<Column> = columns
                    .iter()
                    .zip(scaled)
                    .map(|(name, values)| Column::new(name.as_str().into(), values))
                    .collect();
                Ok(DataFrame::new(out)?)
            }
            FittedColumnTransform::OneHot { vocab } => {
                let mut out = Vec::new();
                for (name, categories) in vocab {
                    encode_onehot(df, name, categories, &mut out)?;
                }
                Ok(DataFrame::new(out)?)
            }
            FittedColumnTransform::OneHotDropBaseline { vocab } => {
                let mut out = Vec::new();
                for (name, baseline, categories) in vocab {
                    encode_onehot_with_baseline(df, name, baseline, categories, &mut out)?;
                }
                Ok(DataFrame::new(out)?)
            }
        }
    }
}

/// The full transformer pipeline: column groups in a fixed output order
/// (passthrough, numeric, stratified, one-hot, one-hot with baseline).
#[derive(Debug, Clone)]
pub struct TransformPipeline {
    transforms: Vec<ColumnTransform>,
}

impl TransformPipeline {
    /// Build the pipeline from the resolved configuration.
    pub fn from_config(config: &ResolvedConfig, stratifier: &str) -> Self {
        let passthrough = config.columns_with_transformer(TransformerKind::Passthrough);
        let numeric = config.columns_with_transformer(TransformerKind::NumericGlobal);
        let stratified = config.columns_with_transformer(TransformerKind::NumericStratified);

        let mut onehot = Vec::new();
        let mut dummy = Vec::new();
        for column in config.iter() {
            if column.transformer == TransformerKind::OneHot {
                match &column.onehot_baseline {
                    Some(baseline) => dummy.push((column.variable.clone(), baseline.clone())),
                    None => onehot.push(column.variable.clone()),
                }
            }
        }

        let mut transforms = Vec::new();
        if !passthrough.is_empty() {
            transforms.push(ColumnTransform::Passthrough {
                columns: passthrough,
            });
        }
        if !numeric.is_empty() {
            transforms.push(ColumnTransform::NumericGlobal { columns: numeric });
        }
        if !stratified.is_empty() {
            transforms.push(ColumnTransform::NumericStratified {
                columns: stratified,
                stratifier: stratifier.to_string(),
            });
        }
        if !onehot.is_empty() {
            transforms.push(ColumnTransform::OneHot { columns: onehot });
        }
        if !dummy.is_empty() {
            transforms.push(ColumnTransform::OneHotDropBaseline { columns: dummy });
        }

        Self { transforms }
    }

    /// Fit on one replicate's rows and transform those same rows.
    ///
    /// The fitted state lives only within this call; nothing escapes the
    /// replicate scope.
    pub fn fit_transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut groups = Vec::with_capacity(self.transforms.len());
        for transform in &self.transforms {
            let fitted = transform.fit(df)?;
            groups.push(fitted.transform(df)?);
        }

        let mut iter = groups.into_iter();
        let mut out = iter
            .next()
            .ok_or_else(|| anyhow::anyhow!("Transformer pipeline has no column groups"))?;
        for group in iter {
            out = out.hstack(group.get_columns())?;
        }

        if out.height() != df.height() {
            bail!(
                "Transformed frame has {} rows but the replicate has {}",
                out.height(),
                df.height()
            );
        }

        Ok(out)
    }

    /// Transform the full table replicate by replicate and concatenate
    /// results in replicate order. Row order inside a replicate is
    /// preserved; row counts are asserted per replicate.
    pub fn transform_replicates(&self, df: &DataFrame) -> Result<DataFrame> {
        let ids = replicate_ids(df)?;
        if ids.is_empty() {
            bail!("Input table has no imputation replicates");
        }

        let mut out: Option<DataFrame> = None;
        for id in ids {
            let replicate = replicate_frame(df, id)?;
            let transformed = self.fit_transform(&replicate)?;
            out = Some(match out {
                None => transformed,
                Some(mut acc) => {
                    acc.vstack_mut(&transformed)?;
                    acc
                }
            });
        }

        let out = out.context("No replicate frames were produced")?;
        if out.height() != df.height() {
            bail!(
                "Concatenated transform output has {} rows, expected {}",
                out.height(),
                df.height()
            );
        }
        Ok(out)
    }
}

/// Distinct replicate ids, ascending.
pub fn replicate_ids(df: &DataFrame) -> Result<Vec<i64>> {
    let col = df
        .column(INDEX_IMPUTE_ID)
        .with_context(|| format!("Input table is missing '{}'", INDEX_IMPUTE_ID))?;
    let cast = col.cast(&DataType::Int64)?;
    let mut ids: Vec<i64> = cast.i64()?.into_iter().flatten().collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        bail!("Input table contains no imputation replicates");
    }
    Ok(ids)
}

/// Rows belonging to one replicate, in their original order.
pub fn replicate_frame(df: &DataFrame, id: i64) -> Result<DataFrame> {
    let out = df
        .clone()
        .lazy()
        .filter(col(INDEX_IMPUTE_ID).cast(DataType::Int64).eq(lit(id)))
        .collect()
        .with_context(|| format!("Failed to select replicate {}", id))?;
    Ok(out)
}

fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let col = df
        .column(name)
        .with_context(|| format!("Column '{}' missing from replicate frame", name))?;
    let cast = col
        .cast(&DataType::Float64)
        .with_context(|| format!("Column '{}' is not numeric", name))?;
    let values: Vec<f64> = cast.f64()?.into_iter().flatten().collect();
    if values.len() != df.height() {
        bail!("Column '{}' contains missing values at transform time", name);
    }
    Ok(values)
}

fn stratum_values(df: &DataFrame, stratifier: &str) -> Result<Vec<String>> {
    let col = df
        .column(stratifier)
        .map_err(|_| TransformError::MissingStratifier {
            column: stratifier.to_string(),
        })?;
    let values = column_to_string_vec(col)?;
    values
        .into_iter()
        .map(|v| v.ok_or_else(|| anyhow::anyhow!("Stratifier column '{}' contains missing values", stratifier)))
        .collect()
}

fn category_vocabulary(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let col = df
        .column(name)
        .with_context(|| format!("Column '{}' missing from replicate frame", name))?;
    let values = column_to_string_vec(col)?;
    let mut vocab: BTreeMap<String, ()> = BTreeMap::new();
    for value in values {
        let value = value
            .ok_or_else(|| anyhow::anyhow!("Column '{}' contains missing values at fit time", name))?;
        vocab.insert(value, ());
    }
    Ok(vocab.into_keys().collect())
}

fn encode_onehot(
    df: &DataFrame,
    name: &str,
    categories: &[String],
    out: &mut Vec<Column>,
) -> Result<()> {
    let values = column_to_string_vec(df.column(name)?)?;
    let mut indicators: Vec<Vec<f64>> = vec![vec![0.0; values.len()]; categories.len()];

    for (row, value) in values.iter().enumerate() {
        let value = value.as_deref().unwrap_or("");
        let idx = categories.iter().position(|c| c == value).ok_or_else(|| {
            TransformError::UnseenCategory {
                column: name.to_string(),
                category: value.to_string(),
            }
        })?;
        indicators[idx][row] = 1.0;
    }

    for (category, column) in categories.iter().zip(indicators) {
        out.push(Column::new(
            format!("{}{}{}", name, FEATURE_SEP, category).into(),
            column,
        ));
    }
    Ok(())
}

fn encode_onehot_with_baseline(
    df: &DataFrame,
    name: &str,
    baseline: &str,
    categories: &[String],
    out: &mut Vec<Column>,
) -> Result<()> {
    let values = column_to_string_vec(df.column(name)?)?;
    let mut indicators: Vec<Vec<f64>> = vec![vec![0.0; values.len()]; categories.len()];

    for (row, value) in values.iter().enumerate() {
        let value = value.as_deref().unwrap_or("");
        if value == baseline {
            continue; // all dummies zero for the reference category
        }
        let idx = categories.iter().position(|c| c == value).ok_or_else(|| {
            TransformError::UnseenCategory {
                column: name.to_string(),
                category: value.to_string(),
            }
        })?;
        indicators[idx][row] = 1.0;
    }

    for (category, column) in categories.iter().zip(indicators) {
        out.push(Column::new(
            format!("{}{}{}", name, FEATURE_SEP, category).into(),
            column,
        ));
    }
    Ok(())
}

/// Mean and standard deviation (population); a zero or undefined std is
/// stored as 1.0 so constant columns scale to zero instead of dividing by
/// zero.
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 1.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    if std > 0.0 {
        (mean, std)
    } else {
        (mean, 1.0)
    }
}
