//! Scored record export

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;

use crate::pipeline::{RawField, ScoredRecord};

/// Records plus engineered fields and scores, one row per record.
pub fn scored_dataframe(scored: &[ScoredRecord]) -> PolarsResult<DataFrame> {
    let text = |f: fn(&ScoredRecord) -> String| scored.iter().map(f).collect::<Vec<_>>();
    let number = |f: fn(&ScoredRecord) -> f64| scored.iter().map(f).collect::<Vec<_>>();

    let mut columns = vec![
        Column::new("Business_ID".into(), text(|s| s.business_id().to_string())),
        Column::new("Business_Type".into(), text(|s| s.business_type().to_string())),
    ];
    for field in RawField::ALL {
        let values: Vec<f64> = scored
            .iter()
            .map(|s| s.engineered.record.raw.get(field))
            .collect();
        columns.push(Column::new(field.column_name().into(), values));
    }
    columns.extend([
        Column::new("Profit".into(), number(|s| s.engineered.profit)),
        Column::new("ProfitMargin".into(), number(|s| s.engineered.profit_margin)),
        Column::new("CashRatio".into(), number(|s| s.engineered.cash_ratio)),
        Column::new(
            "CCC_Calculated".into(),
            number(|s| s.engineered.cash_conversion_cycle),
        ),
        Column::new("PD".into(), number(|s| s.probability_of_default)),
        Column::new(
            "Cluster".into(),
            scored.iter().map(|s| s.segment_id as u32).collect::<Vec<_>>(),
        ),
        Column::new("Cluster_Name".into(), text(|s| s.segment_name.clone())),
        Column::new("ODScore".into(), number(|s| s.od_score)),
        Column::new(
            "Interest_Reduction".into(),
            scored.iter().map(|s| s.interest_eligible).collect::<Vec<_>>(),
        ),
    ]);
    DataFrame::new(columns)
}

/// Write scored records as CSV or Parquet, chosen by extension.
pub fn save_scored(scored: &[ScoredRecord], path: &Path) -> Result<()> {
    let mut df = scored_dataframe(scored).context("Failed to build scored table")?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "csv" => {
            let mut file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            CsvWriter::new(&mut file)
                .finish(&mut df)
                .with_context(|| format!("Failed to write CSV file: {}", path.display()))?;
        }
        "parquet" => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            ParquetWriter::new(file)
                .finish(&mut df)
                .with_context(|| format!("Failed to write Parquet file: {}", path.display()))?;
        }
        _ => anyhow::bail!(
            "Unsupported output format: {}. Supported formats: csv, parquet",
            extension
        ),
    }

    Ok(())
}
