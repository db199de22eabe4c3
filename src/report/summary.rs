//! Run summary report generation

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Color, Table};
use console::style;
use polars::prelude::*;

use super::metrics::{metrics_table, ConfusionMatrix};
use crate::model::TARGET_DRS;
use crate::pipeline::config::TARGET_TREATMENT;

/// Summary of one propensity-score run
#[derive(Debug, Default)]
pub struct PsSummary {
    pub replicates: usize,
    pub feature_columns: usize,
    pub models_trained: usize,
    pub models_pruned: Vec<(String, String)>,
    pub output_rows: usize,
}

impl PsSummary {
    pub fn display(&self) {
        println!();
        println!("    {}", style("RUN SUMMARY").white().bold());
        println!("    {}", style("-".repeat(50)).dim());
        println!();

        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec![
            Cell::new("Metric").add_attribute(Attribute::Bold),
            Cell::new("Value").add_attribute(Attribute::Bold),
        ]);
        table.add_row(vec![
            Cell::new("Imputation replicates"),
            Cell::new(self.replicates),
        ]);
        table.add_row(vec![
            Cell::new("Feature columns"),
            Cell::new(self.feature_columns),
        ]);
        table.add_row(vec![
            Cell::new("Models in output"),
            Cell::new(self.models_trained),
        ]);
        table.add_row(vec![
            Cell::new("Models pruned"),
            Cell::new(self.models_pruned.len()).fg(if self.models_pruned.is_empty() {
                Color::White
            } else {
                Color::Yellow
            }),
        ]);
        table.add_row(vec![Cell::new("Output rows"), Cell::new(self.output_rows)]);

        for line in table.lines() {
            println!("    {}", line);
        }

        for (model, reason) in &self.models_pruned {
            println!(
                "    {} {} dropped: {}",
                style("!").yellow().bold(),
                style(model).yellow(),
                reason
            );
        }
        println!();
    }
}

/// Summary of one DRS run
#[derive(Debug, Default)]
pub struct DrsSummary {
    pub target_definition: String,
    /// (replicate id, selected alpha, cross-validated MCC)
    pub selected: Vec<(i64, f64, f64)>,
    pub output_rows: usize,
}

impl DrsSummary {
    pub fn display(&self) {
        println!();
        println!("    {}", style("MODEL SELECTION").white().bold());
        println!("    {}", style("-".repeat(50)).dim());
        println!();

        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec![
            Cell::new("Replicate").add_attribute(Attribute::Bold),
            Cell::new("Penalty (alpha)").add_attribute(Attribute::Bold),
            Cell::new("CV MCC").add_attribute(Attribute::Bold),
        ]);
        for (id, alpha, mcc) in &self.selected {
            table.add_row(vec![
                Cell::new(id),
                Cell::new(format!("{:.1}", alpha)),
                Cell::new(format!("{:.4}", mcc)),
            ]);
        }
        for line in table.lines() {
            println!("    {}", line);
        }
        println!(
            "    {} target: {}  rows: {}",
            style("*").cyan(),
            self.target_definition,
            self.output_rows
        );
        println!();
    }
}

/// Print confusion-matrix metrics for the long DRS table, overall and
/// split by treatment group.
pub fn display_drs_metrics(table: &DataFrame) -> Result<()> {
    let groups = [
        ("All subjects", None),
        ("Untreated subjects", Some(0i64)),
        ("Treated subjects", Some(1i64)),
    ];
    for (label, treated) in groups {
        let subset = match treated {
            None => table.clone(),
            Some(flag) => table
                .clone()
                .lazy()
                .filter(col(TARGET_TREATMENT).cast(DataType::Int64).eq(lit(flag)))
                .collect()?,
        };
        if subset.height() == 0 {
            continue;
        }

        let actual: Vec<i64> = subset
            .column(TARGET_DRS)?
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .flatten()
            .collect();
        let probs: Vec<f64> = subset
            .column("prediction")?
            .f64()?
            .into_iter()
            .flatten()
            .collect();

        let cm = ConfusionMatrix::from_probabilities(&actual, &probs);
        for line in metrics_table(label, &cm).lines() {
            println!("    {}", line);
        }
        println!();
    }
    Ok(())
}
