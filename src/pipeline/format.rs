//! Column formatting
//!
//! Applies per-column cleaning according to the resolved configuration:
//! numeric mean (or constant) imputation, categorical null-mapping plus
//! string normalization, and boolean value remapping. Every pass ends in a
//! hard post-condition check; a violation is a configuration-data mismatch
//! and fails the run rather than producing silently-wrong output.

use anyhow::{bail, Context, Result};
use polars::prelude::*;

use super::config::{ColumnConfig, Dtype, ResolvedConfig, TransformerKind};
use crate::utils::print_warning;

/// Select the configured columns and run the three formatting passes.
///
/// Output column order equals the resolved config order; the returned frame
/// contains only configured columns.
pub fn format_columns(df: &DataFrame, config: &ResolvedConfig) -> Result<DataFrame> {
    let names = config.column_names();
    let mut out = df
        .select(names.iter().map(|s| s.as_str()))
        .context("Input table is missing configured columns")?;

    for column in config.iter() {
        match column.dtype {
            Dtype::Int | Dtype::Float => format_numeric(&mut out, column)?,
            Dtype::Object => format_categorical(&mut out, column)?,
            Dtype::Bool => format_boolean(&mut out, column)?,
        }
    }

    Ok(out)
}

/// Normalize a raw category so downstream one-hot feature names are
/// predictable: lowercase, whitespace and underscores become dashes,
/// all other punctuation is removed. Output matches `[a-z0-9-]*`.
pub fn normalize_category(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| {
            if c.is_whitespace() || c == '_' || c == '-' {
                Some('-')
            } else if c.is_alphanumeric() {
                c.to_lowercase().next()
            } else {
                None
            }
        })
        .collect()
}

/// Numeric pass: cast to f64, replace missing values with the configured
/// constant or the whole-table column mean, and assert none remain.
///
/// The mean is deliberately computed over the entire table rather than per
/// replicate, matching the source system's behavior.
fn format_numeric(df: &mut DataFrame, config: &ColumnConfig) -> Result<()> {
    let name = config.variable.as_str();
    let col = df.column(name)?;
    let values = col
        .cast(&DataType::Float64)
        .with_context(|| format!("Numeric column '{}' is not castable to float", name))?;
    let ca = values.f64()?.clone();

    let null_count = ca.null_count();
    let filled: Vec<f64> = if null_count > 0 {
        let fill = match &config.map_null {
            Some(raw) => raw.parse::<f64>().with_context(|| {
                format!(
                    "map_null value '{}' for numeric column '{}' is not a number",
                    raw, name
                )
            })?,
            None => ca
                .mean()
                .ok_or_else(|| anyhow::anyhow!("Numeric column '{}' has no non-null values", name))?,
        };
        print_warning(&format!(
            "{} nulls in numeric column '{}' imputed with {:.4}",
            null_count, name, fill
        ));
        ca.into_iter().map(|v| v.unwrap_or(fill)).collect()
    } else {
        ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect()
    };

    // Post-condition: a NaN here means the fill itself was missing.
    if filled.iter().any(|v| v.is_nan()) {
        bail!("Numeric column '{}' still contains missing values after imputation", name);
    }

    df.with_column(Column::new(name.into(), filled))?;
    Ok(())
}

/// Categorical pass: map nulls to the configured fallback category, then
/// normalize every value for one-hot encoding.
fn format_categorical(df: &mut DataFrame, config: &ColumnConfig) -> Result<()> {
    let name = config.variable.as_str();
    let values = column_to_string_vec(df.column(name)?)?;

    let null_count = values.iter().filter(|v| v.is_none()).count();
    if null_count > 0 {
        match &config.map_null {
            Some(fallback) => print_warning(&format!(
                "{} nulls in categorical column '{}' cast as '{}'",
                null_count, name, fallback
            )),
            None => bail!(
                "Categorical column '{}' contains {} missing values and no map_null is configured",
                name,
                null_count
            ),
        }
    }

    // Identifier columns pass through with their raw values; only columns
    // headed for the encoder get their categories normalized.
    let normalize = config.transformer != TransformerKind::Passthrough;
    let cleaned: Vec<String> = values
        .into_iter()
        .map(|v| {
            let raw = v.unwrap_or_else(|| config.map_null.clone().unwrap_or_default());
            if normalize {
                normalize_category(&raw)
            } else {
                raw
            }
        })
        .collect();

    df.with_column(Column::new(name.into(), cleaned))?;
    Ok(())
}

/// Boolean pass: values must already be 0/1 or mappable through the
/// configured two-value substitution. More than two distinct raw values is
/// a fatal configuration error.
fn format_boolean(df: &mut DataFrame, config: &ColumnConfig) -> Result<()> {
    let name = config.variable.as_str();
    let values = column_to_string_vec(df.column(name)?)?;

    let null_count = values.iter().filter(|v| v.is_none()).count();
    if null_count > 0 && config.map_null.is_none() {
        bail!(
            "Boolean column '{}' contains {} missing values and no map_null is configured",
            name,
            null_count
        );
    }
    if null_count > 0 {
        print_warning(&format!(
            "{} nulls in boolean column '{}' cast as '{}'",
            null_count,
            name,
            config.map_null.as_deref().unwrap_or("")
        ));
    }

    let mut distinct: Vec<String> = values.iter().flatten().cloned().collect();
    distinct.sort();
    distinct.dedup();
    if distinct.len() > 2 {
        bail!(
            "Boolean column '{}' takes on more than two values: {:?}",
            name,
            distinct
        );
    }

    let mapped: Vec<f64> = values
        .iter()
        .map(|v| {
            let raw = match v {
                Some(s) => s.clone(),
                None => config.map_null.clone().unwrap_or_default(),
            };
            map_boolean_value(&raw, config)
                .ok_or_else(|| anyhow::anyhow!("Boolean column '{}' contains unmappable value '{}'", name, raw))
        })
        .collect::<Result<_>>()?;

    // Post-condition: numeric dtype with values in {0, 1} only.
    debug_assert!(mapped.iter().all(|v| *v == 0.0 || *v == 1.0));

    df.with_column(Column::new(name.into(), mapped))?;
    Ok(())
}

fn map_boolean_value(raw: &str, config: &ColumnConfig) -> Option<f64> {
    // 0/1 (and float spellings) always pass through, so configs only need
    // bool_0/bool_1 for columns with non-numeric raw encodings.
    match raw.trim() {
        "0" | "0.0" => return Some(0.0),
        "1" | "1.0" => return Some(1.0),
        _ => {}
    }
    if config.bool_zero.as_deref() == Some(raw) {
        return Some(0.0);
    }
    if config.bool_one.as_deref() == Some(raw) {
        return Some(1.0);
    }
    None
}

/// Convert any column to owned optional strings for comparison.
pub(crate) fn column_to_string_vec(col: &Column) -> Result<Vec<Option<String>>> {
    let values: Vec<Option<String>> = match col.dtype() {
        DataType::String => col
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.to_string()))
            .collect(),
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            let cast = col.cast(&DataType::Int64)?;
            cast.i64()?
                .into_iter()
                .map(|v| v.map(|n| n.to_string()))
                .collect()
        }
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            let cast = col.cast(&DataType::UInt64)?;
            cast.u64()?
                .into_iter()
                .map(|v| v.map(|n| n.to_string()))
                .collect()
        }
        DataType::Float32 | DataType::Float64 => {
            let cast = col.cast(&DataType::Float64)?;
            cast.f64()?
                .into_iter()
                .map(|v| v.map(|n| format!("{}", n)))
                .collect()
        }
        DataType::Boolean => col
            .bool()?
            .into_iter()
            .map(|v| v.map(|b| (b as u8).to_string()))
            .collect(),
        _ => {
            let cast = col.cast(&DataType::String)?;
            cast.str()?
                .into_iter()
                .map(|v| v.map(|s| s.to_string()))
                .collect()
        }
    };

    Ok(values)
}
