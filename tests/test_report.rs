//! Integration tests for the sector report and scored output

use odrisk::pipeline::*;
use odrisk::report::{analyze_sectors, save_scored};
use polars::prelude::*;
use tempfile::TempDir;

#[path = "common/mod.rs"]
mod common;

use common::*;

fn scored_batch(n: usize, seed: u64) -> (Vec<ScoredRecord>, Vec<String>) {
    let records = generate_records(n, seed);
    let mut pipeline = Pipeline::new(small_config());
    pipeline.fit(&records, &SilentObserver).unwrap();
    let names = pipeline.context().unwrap().segmenter().segment_names.clone();
    (pipeline.score(&records).unwrap(), names)
}

#[test]
fn test_sector_report_covers_every_sector() {
    let (scored, names) = scored_batch(150, 51);
    let report = analyze_sectors(&scored, &names);

    assert_eq!(report.total_records, 150);
    assert_eq!(report.sectors.len(), SECTORS.len());
    assert_eq!(report.sectors.iter().map(|s| s.count).sum::<usize>(), 150);

    for (index, sector) in report.sectors.iter().enumerate() {
        assert_eq!(sector.risk_rank, index + 1);
        assert_eq!(
            sector.segment_counts.iter().map(|(_, c)| c).sum::<usize>(),
            sector.count
        );
        assert!((0.0..=100.0).contains(&sector.interest_reduction_pct));
    }
    for pair in report.sectors.windows(2) {
        assert!(pair[0].avg_pd <= pair[1].avg_pd);
    }
    for sector in SECTORS {
        assert!(report.rank_of(sector).is_some(), "{} missing", sector);
    }
}

#[test]
fn test_eligibility_follows_thresholds() {
    let (scored, _) = scored_batch(150, 53);
    for record in &scored {
        let expected = record.probability_of_default < 0.15
            && record.engineered.record.raw.od_utilization > 0.70;
        assert_eq!(record.interest_eligible, expected);
        assert!(
            (record.od_score
                - (1.0 - record.probability_of_default) * record.engineered.cash_ratio)
                .abs()
                < 1e-12
        );
    }
}

#[test]
fn test_report_files_are_written() {
    let (scored, names) = scored_batch(120, 57);
    let report = analyze_sectors(&scored, &names);
    let dir = TempDir::new().unwrap();

    let csv_path = dir.path().join("strategy.csv");
    report.write_csv(&csv_path).unwrap();
    let df = CsvReadOptions::default()
        .try_into_reader_with_file_path(Some(csv_path))
        .unwrap()
        .finish()
        .unwrap();
    assert_eq!(df.height(), SECTORS.len());
    assert_has_columns(&df, &["Business_Type", "Avg_PD", "Risk_Rank", "Interest_Reduction_Pct"]);
    for name in &names {
        assert_has_columns(&df, &[format!("Cluster_{}", name).as_str()]);
    }

    let json_path = dir.path().join("strategy.json");
    report.write_json(&json_path).unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(json_path).unwrap()).unwrap();
    assert_eq!(json["sectors"].as_array().unwrap().len(), SECTORS.len());
}

#[test]
fn test_scored_output_round_trips_through_parquet() {
    let (scored, _) = scored_batch(120, 59);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scored.parquet");

    save_scored(&scored, &path).unwrap();
    let df = LazyFrame::scan_parquet(&path, Default::default())
        .unwrap()
        .collect()
        .unwrap();

    assert_eq!(df.height(), 120);
    assert_has_columns(
        &df,
        &["Business_ID", "PD", "Cluster", "Cluster_Name", "ODScore", "Interest_Reduction"],
    );
    let pd: Vec<f64> = df.column("PD").unwrap().f64().unwrap().into_no_null_iter().collect();
    for (value, record) in pd.iter().zip(&scored) {
        assert_eq!(*value, record.probability_of_default);
    }
}
