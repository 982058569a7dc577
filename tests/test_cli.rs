//! Tests for CLI argument parsing and the command surface

use std::path::PathBuf;

use assert_cmd::Command;
use clap::Parser;
use odrisk::cli::{Cli, Commands};
use predicates::prelude::*;
use tempfile::TempDir;

#[path = "common/mod.rs"]
mod common;

use common::*;

fn odrisk() -> Command {
    let mut cmd = Command::cargo_bin("odrisk").unwrap();
    cmd.env_remove("ODRISK_CONFIG").env_remove("ODRISK_ARTIFACTS");
    cmd
}

#[test]
fn test_fit_defaults() {
    let cli = Cli::parse_from(["odrisk", "fit", "-i", "data/businesses.csv"]);
    assert!(cli.config.is_none());

    let Commands::Fit(args) = cli.command else {
        panic!("expected the fit subcommand");
    };
    assert_eq!(args.artifacts, PathBuf::from("models"));
    assert_eq!(args.infer_schema_length, 10000);
    assert_eq!(args.output_path(), PathBuf::from("data/businesses_scored.csv"));
    assert_eq!(args.report_path(), PathBuf::from("data/businesses_strategy.csv"));
    assert_eq!(args.schema_rows(), Some(10000));
}

#[test]
fn test_score_with_explicit_paths() {
    let cli = Cli::parse_from([
        "odrisk",
        "--config",
        "odrisk.json",
        "score",
        "-i",
        "in.parquet",
        "-a",
        "artifacts",
        "-o",
        "out.parquet",
        "--infer-schema-length",
        "0",
    ]);
    assert_eq!(cli.config, Some(PathBuf::from("odrisk.json")));

    let Commands::Score(args) = cli.command else {
        panic!("expected the score subcommand");
    };
    assert_eq!(args.artifacts, PathBuf::from("artifacts"));
    assert_eq!(args.output_path(), PathBuf::from("out.parquet"));
    assert_eq!(args.schema_rows(), None);
}

#[test]
fn test_simulate_flags() {
    let cli = Cli::parse_from(["odrisk", "simulate", "--json", "-i", "business.json"]);
    let Commands::Simulate(args) = cli.command else {
        panic!("expected the simulate subcommand");
    };
    assert!(args.json);
    assert_eq!(args.input, Some(PathBuf::from("business.json")));
}

#[test]
fn test_fit_requires_input() {
    assert!(Cli::try_parse_from(["odrisk", "fit"]).is_err());
}

#[test]
fn test_config_command_prints_defaults() {
    odrisk()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("pca_variance_threshold"))
        .stdout(predicate::str::contains("\"seed\": 42"));
}

#[test]
fn test_environment_overrides_reach_the_config() {
    odrisk()
        .env("ODRISK_CLUSTERS", "3")
        .env("ODRISK_SEGMENT_NAMES", "Low,Mid,High")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"clusters\": 3"));
}

#[test]
fn test_invalid_configuration_is_reported() {
    odrisk()
        .env("ODRISK_CLUSTERS", "3")
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("segment name"));
}

#[test]
fn test_score_without_artifacts_fails() {
    let dir = TempDir::new().unwrap();
    let mut df = records_dataframe(&generate_records(5, 61));
    let (_data_dir, csv_path) = create_temp_csv(&mut df);

    odrisk()
        .arg("score")
        .arg("-i")
        .arg(&csv_path)
        .arg("-a")
        .arg(dir.path().join("missing"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load artifacts"));
}

#[test]
fn test_fit_score_and_simulate_end_to_end() {
    let records = generate_records(150, 67);
    let mut df = records_dataframe(&records);
    let (data_dir, csv_path) = create_temp_csv(&mut df);

    let config_path = data_dir.path().join("odrisk.json");
    std::fs::write(&config_path, serde_json::to_string(&small_config()).unwrap()).unwrap();
    let artifacts = data_dir.path().join("models");

    odrisk()
        .arg("--config")
        .arg(&config_path)
        .arg("fit")
        .arg("-i")
        .arg(&csv_path)
        .arg("-a")
        .arg(&artifacts)
        .assert()
        .success();

    let current = std::fs::read_to_string(artifacts.join("CURRENT")).unwrap();
    assert!(artifacts
        .join("fits")
        .join(current.trim())
        .join("manifest.json")
        .is_file());
    assert!(data_dir.path().join("businesses_scored.csv").is_file());
    assert!(data_dir.path().join("businesses_strategy.csv").is_file());
    assert!(data_dir.path().join("businesses_strategy.json").is_file());

    let scored_path = data_dir.path().join("rescored.csv");
    odrisk()
        .arg("--config")
        .arg(&config_path)
        .arg("score")
        .arg("-i")
        .arg(&csv_path)
        .arg("-a")
        .arg(&artifacts)
        .arg("-o")
        .arg(&scored_path)
        .assert()
        .success();
    assert!(scored_path.is_file());

    let business_path = data_dir.path().join("business.json");
    std::fs::write(&business_path, serde_json::to_string(&raw_map(&records[0])).unwrap()).unwrap();
    odrisk()
        .arg("--config")
        .arg(&config_path)
        .arg("simulate")
        .arg("-a")
        .arg(&artifacts)
        .arg("-i")
        .arg(&business_path)
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("probability_of_default"));
}
