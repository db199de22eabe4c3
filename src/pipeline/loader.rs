//! CSV loading and saving for the cohort table and the variable schema

use anyhow::{Context, Result};
use polars::prelude::*;
use std::path::Path;

/// Load the cohort dataset from a CSV file.
///
/// `infer_schema_length` of 0 requests a full-table scan for type inference.
pub fn load_dataset(path: &Path, infer_schema_length: usize) -> Result<DataFrame> {
    let infer = if infer_schema_length == 0 {
        None
    } else {
        Some(infer_schema_length)
    };

    let df = LazyCsvReader::new(path)
        .with_infer_schema_length(infer)
        .finish()
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?
        .collect()
        .with_context(|| format!("Failed to load CSV file: {}", path.display()))?;

    Ok(df)
}

/// Load the variable-handling schema table.
///
/// Every column is read as a string so that boolean encodings such as "Y"/"N"
/// and numeric fallback values survive untouched; typed parsing happens in
/// the configuration resolver.
pub fn load_schema(path: &Path) -> Result<DataFrame> {
    let df = LazyCsvReader::new(path)
        .with_infer_schema_length(Some(0))
        .finish()
        .with_context(|| format!("Failed to open schema file: {}", path.display()))?
        .collect()
        .with_context(|| format!("Failed to load schema file: {}", path.display()))?;

    Ok(df)
}

/// Save a DataFrame to a CSV file
pub fn save_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    CsvWriter::new(&mut file)
        .finish(df)
        .with_context(|| format!("Failed to write CSV file: {}", path.display()))?;

    Ok(())
}

/// Shape and memory statistics for a loaded dataset
pub fn dataset_stats(df: &DataFrame) -> (usize, usize, f64) {
    let (rows, cols) = df.shape();
    let memory_mb = df.estimated_size() as f64 / (1024.0 * 1024.0);
    (rows, cols, memory_mb)
}
