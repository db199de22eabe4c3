//! Tests for CLI argument parsing and binary smoke behavior

mod common;

use assert_cmd::Command;
use clap::Parser;
use common::*;
use polars::prelude::SerWriter;
use predicates::prelude::*;
use pscore::cli::{Cli, Commands};

#[test]
fn test_ps_defaults() {
    let cli = Cli::parse_from(["pscore", "ps", "-i", "cohort.csv", "-c", "schema.csv"]);

    match cli.command {
        Commands::Ps {
            stratifier,
            infer_schema_length,
            output,
            ..
        } => {
            assert_eq!(stratifier, "health_system");
            assert_eq!(infer_schema_length, 10000);
            assert!(output.is_none());
        }
        _ => panic!("expected the ps subcommand"),
    }
}

#[test]
fn test_drs_defaults() {
    let cli = Cli::parse_from(["pscore", "drs", "-i", "cohort.csv", "-c", "schema.csv"]);

    match cli.command {
        Commands::Drs {
            target_definition,
            cv_folds,
            ..
        } => {
            assert_eq!(target_definition, "all_30d");
            assert_eq!(cv_folds, 5);
        }
        _ => panic!("expected the drs subcommand"),
    }
}

#[test]
fn test_cv_folds_validation_rejects_one() {
    let result = Cli::try_parse_from([
        "pscore",
        "drs",
        "-i",
        "cohort.csv",
        "-c",
        "schema.csv",
        "--cv-folds",
        "1",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_binary_requires_a_subcommand() {
    Command::cargo_bin("pscore")
        .unwrap()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_binary_fails_cleanly_on_missing_input() {
    Command::cargo_bin("pscore")
        .unwrap()
        .args(["ps", "-i", "does_not_exist.csv", "-c", "also_missing.csv"])
        .assert()
        .failure();
}

#[test]
fn test_binary_ps_run_end_to_end() {
    let mut df = cohort_dataframe();
    let (temp_dir, input) = create_temp_csv(&mut df);

    let mut schema = schema_dataframe(None);
    let schema_path = temp_dir.path().join("schema.csv");
    let mut file = std::fs::File::create(&schema_path).unwrap();
    polars::prelude::CsvWriter::new(&mut file)
        .finish(&mut schema)
        .unwrap();

    let output = temp_dir.path().join("ps_models.csv");
    Command::cargo_bin("pscore")
        .unwrap()
        .args([
            "ps",
            "-i",
            input.to_str().unwrap(),
            "-c",
            schema_path.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    assert!(output.exists());
}
