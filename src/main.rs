//! Pscore: propensity and disease-risk score estimation
//!
//! A command-line tool for fitting candidate propensity-score models and
//! disease-risk-score models across multiple-imputation replicates of an
//! observational cohort.

use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;

use pscore::cli::{derive_output_path, Cli, Commands};
use pscore::model::{
    self, derive_target, drs::drs_feature_columns, feature_columns, merge_wide_tables,
    train_boosting, train_drs, train_forest, train_logistic, TargetDefinition,
};
use pscore::pipeline::{
    self, dataset_stats, format_columns, load_dataset, load_schema, replicate_ids,
    resolve_configs, save_csv, Step, TransformPipeline,
};
use pscore::report::{display_drs_metrics, save_calibration_curves, DrsSummary, PsSummary};
use pscore::utils::{
    create_spinner, finish_with_success, print_banner, print_completion, print_config,
    print_count, print_info, print_step_header, print_step_time, print_success, print_warning,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ps {
            input,
            config,
            output,
            formatted_output,
            stratifier,
            infer_schema_length,
        } => {
            let output = output.unwrap_or_else(|| derive_output_path(&input, "ps_models", "csv"));
            let formatted =
                formatted_output.unwrap_or_else(|| derive_output_path(&input, "formatted", "csv"));
            run_ps(
                &input,
                &config,
                &output,
                &formatted,
                &stratifier,
                infer_schema_length,
            )
        }
        Commands::Drs {
            input,
            config,
            output,
            calibration_output,
            target_definition,
            stratifier,
            cv_folds,
            infer_schema_length,
        } => {
            let output = output.unwrap_or_else(|| derive_output_path(&input, "drs_results", "csv"));
            let calibration = calibration_output
                .unwrap_or_else(|| derive_output_path(&input, "calibration", "json"));
            let target: TargetDefinition = target_definition
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            run_drs(
                &input,
                &config,
                &output,
                &calibration,
                &target,
                &stratifier,
                cv_folds,
                infer_schema_length,
            )
        }
    }
}

fn run_ps(
    input: &Path,
    config_path: &Path,
    output: &Path,
    formatted_output: &Path,
    stratifier: &str,
    infer_schema_length: usize,
) -> Result<()> {
    print_banner(env!("CARGO_PKG_VERSION"));
    print_config(input, config_path, output);

    // Step 1: Load dataset and variable schema
    print_step_header(1, "Load Data");
    let step_start = Instant::now();
    let spinner = create_spinner("Reading input table...");
    let df = load_dataset(input, infer_schema_length)?;
    let schema = load_schema(config_path)?;
    finish_with_success(&spinner, "Dataset loaded");
    let (rows, cols, memory_mb) = dataset_stats(&df);
    println!("      Rows: {}", rows);
    println!("      Columns: {}", cols);
    println!("      Estimated memory: {:.2} MB", memory_mb);
    print_step_time(step_start.elapsed());

    // Step 2: Resolve the variable configuration against live columns
    print_step_header(2, "Resolve Configuration");
    let step_start = Instant::now();
    let column_names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let resolved = resolve_configs(&column_names, &schema, Step::Ps, &[])?;
    print_count("configured variable(s)", resolved.len(), None);
    report_schema_drift(&resolved);
    print_step_time(step_start.elapsed());

    // Step 3: Format columns per the resolved configuration
    print_step_header(3, "Format Columns");
    let step_start = Instant::now();
    let spinner = create_spinner("Formatting columns...");
    let mut formatted = format_columns(&df, &resolved)?;
    finish_with_success(&spinner, "Columns formatted");
    save_csv(&mut formatted, formatted_output)?;
    print_success(&format!(
        "Formatted frame saved to {}",
        formatted_output.display()
    ));
    print_step_time(step_start.elapsed());

    // Step 4: Fit and apply the per-replicate transformer pipeline
    print_step_header(4, "Transform Features");
    let step_start = Instant::now();
    let replicates = replicate_ids(&formatted)?;
    print_count("imputation replicate(s)", replicates.len(), None);
    let spinner = create_spinner("Fitting per-replicate transforms...");
    let transform = TransformPipeline::from_config(&resolved, stratifier);
    let transformed = transform.transform_replicates(&formatted)?;
    finish_with_success(&spinner, "Features transformed");
    print_step_time(step_start.elapsed());

    // Step 5: Train the three model families
    print_step_header(5, "Train Candidate Models");
    let step_start = Instant::now();

    let spinner = create_spinner("Training logistic regressions...");
    let logistic = train_logistic(&transformed)?;
    finish_with_success(&spinner, "Logistic family trained");
    for (model, reason) in &logistic.pruned {
        print_warning(&format!("{} failed to converge ({})", model, reason));
    }

    let spinner = create_spinner("Training random forests...");
    let forest = train_forest(&transformed)?;
    finish_with_success(&spinner, "Forest family trained");

    let spinner = create_spinner("Training gradient-boosted trees...");
    let boosted = train_boosting(&transformed)?;
    finish_with_success(&spinner, "Boosting family trained");
    print_step_time(step_start.elapsed());

    // Step 6: Merge and save
    print_step_header(6, "Merge and Save");
    let step_start = Instant::now();
    let pruned = logistic.pruned.clone();
    let n_features = feature_columns(&transformed).len();
    let mut merged = merge_wide_tables(vec![logistic.table, forest, boosted])?;
    let models_trained = merged.width() - model::carried_columns().len();
    save_csv(&mut merged, output)?;
    print_success(&format!("Saved to {}", output.display()));
    print_step_time(step_start.elapsed());

    let summary = PsSummary {
        replicates: replicates.len(),
        feature_columns: n_features,
        models_trained,
        models_pruned: pruned,
        output_rows: merged.height(),
    };
    summary.display();
    print_completion("Propensity-score run complete");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_drs(
    input: &Path,
    config_path: &Path,
    output: &Path,
    calibration_output: &Path,
    target: &TargetDefinition,
    stratifier: &str,
    cv_folds: usize,
    infer_schema_length: usize,
) -> Result<()> {
    print_banner(env!("CARGO_PKG_VERSION"));
    print_config(input, config_path, output);

    // Step 1: Load dataset and variable schema
    print_step_header(1, "Load Data");
    let step_start = Instant::now();
    let spinner = create_spinner("Reading input table...");
    let df = load_dataset(input, infer_schema_length)?;
    let schema = load_schema(config_path)?;
    finish_with_success(&spinner, "Dataset loaded");
    let (rows, cols, memory_mb) = dataset_stats(&df);
    println!("      Rows: {}", rows);
    println!("      Columns: {}", cols);
    println!("      Estimated memory: {:.2} MB", memory_mb);
    print_step_time(step_start.elapsed());

    // Step 2: Resolve the variable configuration against live columns
    print_step_header(2, "Resolve Configuration");
    let step_start = Instant::now();
    let column_names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let resolved = resolve_configs(&column_names, &schema, Step::Drs, &target.source_columns())?;
    print_count("configured variable(s)", resolved.len(), None);
    report_schema_drift(&resolved);
    print_step_time(step_start.elapsed());

    // Step 3: Format and transform
    print_step_header(3, "Format and Transform");
    let step_start = Instant::now();
    let spinner = create_spinner("Formatting columns...");
    let formatted = format_columns(&df, &resolved)?;
    finish_with_success(&spinner, "Columns formatted");
    let spinner = create_spinner("Fitting per-replicate transforms...");
    let transform = TransformPipeline::from_config(&resolved, stratifier);
    let transformed = transform.transform_replicates(&formatted)?;
    finish_with_success(&spinner, "Features transformed");
    print_step_time(step_start.elapsed());

    // Step 4: Derive the composite target and train per replicate
    print_step_header(4, "Train DRS Model");
    let step_start = Instant::now();
    print_info(&format!("Target definition: {}", target));
    let with_target = derive_target(&transformed, target)?;
    let n_features = drs_feature_columns(&with_target).len();
    print_count("feature column(s)", n_features, None);
    let spinner = create_spinner("Cross-validated model selection...");
    let drs = train_drs(&with_target, cv_folds)?;
    finish_with_success(&spinner, "DRS models trained");
    print_step_time(step_start.elapsed());

    // Step 5: Save results, calibration curves and metrics
    print_step_header(5, "Save and Report");
    let step_start = Instant::now();
    let mut table = drs.table;
    save_csv(&mut table, output)?;
    print_success(&format!("Saved to {}", output.display()));
    save_calibration_curves(&table, &target.to_string(), calibration_output)?;
    print_success(&format!(
        "Calibration curves saved to {}",
        calibration_output.display()
    ));
    display_drs_metrics(&table)?;
    print_step_time(step_start.elapsed());

    let summary = DrsSummary {
        target_definition: target.to_string(),
        selected: drs.selected,
        output_rows: table.height(),
    };
    summary.display();
    print_completion("Disease-risk-score run complete");
    Ok(())
}

fn report_schema_drift(resolved: &pipeline::ResolvedConfig) {
    for column in &resolved.unmatched_data_columns {
        print_warning(&format!(
            "Data column '{}' has no configuration entry; excluded from modeling",
            column
        ));
    }
    for column in &resolved.unmatched_config_rows {
        print_warning(&format!(
            "Configured variable '{}' not present in the data",
            column
        ));
    }
}
