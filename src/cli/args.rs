//! Command-line argument definitions using clap

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Pscore - Estimate propensity and disease-risk scores on multiply-imputed cohorts
#[derive(Parser, Debug)]
#[command(name = "pscore")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fit candidate propensity-score models (LR, RF, GBT) per imputation replicate
    Ps {
        /// Input CSV with one row per subject per imputation replicate
        #[arg(short, long)]
        input: PathBuf,

        /// Variable-handling schema CSV (variable, dtype, transformer, ...)
        #[arg(short, long)]
        config: PathBuf,

        /// Output CSV for the merged wide model table.
        /// Defaults to the input directory with a '_ps_models' suffix.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Where to write the formatted intermediate frame.
        /// Defaults to the input directory with a '_formatted' suffix.
        #[arg(long)]
        formatted_output: Option<PathBuf>,

        /// Column used for intra-stratum numeric standardization
        #[arg(long, default_value = "health_system")]
        stratifier: String,

        /// Number of rows to use for schema inference (CSV only).
        /// Use 0 for full table scan (slow for large files).
        #[arg(long, default_value = "10000")]
        infer_schema_length: usize,
    },

    /// Fit the disease-risk-score model on untreated subjects per replicate
    Drs {
        /// Input CSV with one row per subject per imputation replicate
        #[arg(short, long)]
        input: PathBuf,

        /// Variable-handling schema CSV (variable, dtype, transformer, ...)
        #[arg(short, long)]
        config: PathBuf,

        /// Output CSV for the long-format DRS result table.
        /// Defaults to the input directory with a '_drs_results' suffix.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Where to write the per-replicate calibration curves (JSON).
        /// Defaults to the input directory with a '_calibration.json' suffix.
        #[arg(long)]
        calibration_output: Option<PathBuf>,

        /// Composite adverse-outcome definition.
        /// Options: "all_30d" (default), "all_14d", or a single outcome flag
        /// such as "death_30d"
        #[arg(long, default_value = "all_30d")]
        target_definition: String,

        /// Column used for intra-stratum numeric standardization
        #[arg(long, default_value = "health_system")]
        stratifier: String,

        /// Number of cross-validation folds for hyperparameter selection
        #[arg(long, default_value = "5", value_parser = validate_cv_folds)]
        cv_folds: usize,

        /// Number of rows to use for schema inference (CSV only).
        /// Use 0 for full table scan (slow for large files).
        #[arg(long, default_value = "10000")]
        infer_schema_length: usize,
    },
}

/// Derive an output path next to the input, replacing the extension and
/// appending a suffix to the file stem (e.g. data.csv -> data_ps_models.csv).
pub fn derive_output_path(input: &Path, suffix: &str, extension: &str) -> PathBuf {
    let parent = input.parent().unwrap_or_else(|| Path::new("."));
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    parent.join(format!("{}_{}.{}", stem, suffix, extension))
}

/// Validator for cv_folds parameter
fn validate_cv_folds(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid integer", s))?;

    if value < 2 {
        Err(format!("cv_folds must be at least 2, got {}", value))
    } else {
        Ok(value)
    }
}
