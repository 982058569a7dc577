//! Shared test utilities and fixture generators

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;

use odrisk::pipeline::{PipelineConfig, RawField, RawFinancials, Record};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

pub const SECTORS: [&str; 5] = ["Hospitality", "Manufacturing", "Retail", "Services", "Wholesale"];

/// Generate `n` plausible businesses from a fixed seed.
///
/// Ranges are wide enough that every proxy-label rule fires for a good share
/// of rows, so both classes are always present.
pub fn generate_records(n: usize, seed: u64) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..n)
        .map(|i| {
            let revenue_per_day = rng.gen_range(5_000.0..60_000.0);
            let expense_per_day = revenue_per_day * rng.gen_range(0.60..1.05);
            let monthly_revenue = revenue_per_day * 30.0;
            let monthly_expense = expense_per_day * 30.0;
            let inventory_days = rng.gen_range(5.0..90.0);
            let receivable_days = rng.gen_range(5.0..90.0);
            let payable_days = rng.gen_range(5.0..90.0);

            let raw = RawFinancials {
                revenue_per_day,
                expense_per_day,
                monthly_revenue,
                monthly_expense,
                cash_inflow: monthly_revenue * rng.gen_range(0.8..1.2),
                cash_outflow: monthly_expense * rng.gen_range(0.8..1.2),
                od_required: rng.gen_range(50_000.0..1_000_000.0),
                od_utilization: rng.gen_range(0.05..0.98),
                inventory_days,
                receivable_days,
                payable_days,
                cash_conversion_cycle: inventory_days + receivable_days - payable_days,
                credit_score: rng.gen_range(450.0..850.0_f64).round(),
                debt_to_revenue_ratio: rng.gen_range(0.01..0.35),
                emi_obligation: rng.gen_range(0.0..200_000.0),
            };
            Record::new(format!("B-{:04}", i + 1), SECTORS[i % SECTORS.len()], raw)
        })
        .collect()
}

/// A configuration that fits in well under a second.
pub fn small_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.kmeans.restarts = 3;
    config.kmeans.max_iterations = 100;
    config.classifier.hidden_layers = vec![16, 8];
    config.classifier.batch_size = 32;
    config.classifier.max_epochs = 15;
    config
}

/// The raw fields of `record` keyed by column name.
pub fn raw_map(record: &Record) -> HashMap<String, f64> {
    RawField::ALL
        .iter()
        .map(|field| (field.column_name().to_string(), record.raw.get(*field)))
        .collect()
}

/// Input frame with the id, type and fifteen raw columns.
pub fn records_dataframe(records: &[Record]) -> DataFrame {
    let mut columns: Vec<Column> = Vec::with_capacity(RawField::COUNT + 2);
    columns.push(Column::new(
        "Business_ID".into(),
        records.iter().map(|r| r.business_id.clone()).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        "Business_Type".into(),
        records.iter().map(|r| r.business_type.clone()).collect::<Vec<_>>(),
    ));
    for field in RawField::ALL {
        columns.push(Column::new(
            field.column_name().into(),
            records.iter().map(|r| r.raw.get(field)).collect::<Vec<f64>>(),
        ));
    }
    DataFrame::new(columns).unwrap()
}

/// Create a temporary directory with a test CSV file
pub fn create_temp_csv(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("businesses.csv");

    let mut file = std::fs::File::create(&csv_path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();

    (temp_dir, csv_path)
}

/// Create a temporary directory with a test Parquet file
pub fn create_temp_parquet(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let parquet_path = temp_dir.path().join("businesses.parquet");

    let file = std::fs::File::create(&parquet_path).unwrap();
    ParquetWriter::new(file).finish(df).unwrap();

    (temp_dir, parquet_path)
}

/// Assert that a DataFrame contains specific columns
pub fn assert_has_columns(df: &DataFrame, expected_cols: &[&str]) {
    let actual_cols: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    for col in expected_cols {
        assert!(
            actual_cols.contains(&col.to_string()),
            "Missing expected column: '{}'. Actual columns: {:?}",
            col,
            actual_cols
        );
    }
}

/// Assert two probabilities agree to within floating-point noise
pub fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-12, "expected {} to equal {}", a, b);
}
