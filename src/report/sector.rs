//! Sector strategy report
//!
//! Reduces scored records by business type and ranks sectors from least to
//! most risky by mean probability of default.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, CellAlignment, Color, Table};
use console::style;
use polars::prelude::*;
use serde::Serialize;

use crate::pipeline::ScoredRecord;

/// Aggregates for one business type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorSummary {
    pub business_type: String,
    pub count: usize,
    pub avg_pd: f64,
    pub avg_od_score: f64,
    pub avg_cash_ratio: f64,
    pub avg_profit: f64,
    pub avg_profit_margin: f64,
    pub avg_credit_score: f64,
    pub avg_od_utilization: f64,
    pub interest_reduction_count: usize,
    /// Share eligible for interest reduction, in percent, two decimals.
    pub interest_reduction_pct: f64,
    /// 1 = lowest mean PD.
    pub risk_rank: usize,
    /// Records per segment name, in segment index order.
    pub segment_counts: Vec<(String, usize)>,
}

/// Sector summaries ordered by risk rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorReport {
    pub sectors: Vec<SectorSummary>,
    pub segment_names: Vec<String>,
    pub total_records: usize,
}

#[derive(Default)]
struct Accumulator {
    count: usize,
    pd: f64,
    od_score: f64,
    cash_ratio: f64,
    profit: f64,
    profit_margin: f64,
    credit_score: f64,
    od_utilization: f64,
    eligible: usize,
    segments: Vec<usize>,
}

/// Build the sector report from scored records.
pub fn analyze_sectors(scored: &[ScoredRecord], segment_names: &[String]) -> SectorReport {
    let mut groups: BTreeMap<&str, Accumulator> = BTreeMap::new();

    for record in scored {
        let acc = groups.entry(record.business_type()).or_insert_with(|| Accumulator {
            segments: vec![0; segment_names.len()],
            ..Default::default()
        });
        let engineered = &record.engineered;
        acc.count += 1;
        acc.pd += record.probability_of_default;
        acc.od_score += record.od_score;
        acc.cash_ratio += engineered.cash_ratio;
        acc.profit += engineered.profit;
        acc.profit_margin += engineered.profit_margin;
        acc.credit_score += engineered.record.raw.credit_score;
        acc.od_utilization += engineered.record.raw.od_utilization;
        if record.interest_eligible {
            acc.eligible += 1;
        }
        if let Some(slot) = acc.segments.get_mut(record.segment_id) {
            *slot += 1;
        }
    }

    let mut sectors: Vec<SectorSummary> = groups
        .into_iter()
        .map(|(business_type, acc)| {
            let n = acc.count as f64;
            SectorSummary {
                business_type: business_type.to_string(),
                count: acc.count,
                avg_pd: acc.pd / n,
                avg_od_score: acc.od_score / n,
                avg_cash_ratio: acc.cash_ratio / n,
                avg_profit: acc.profit / n,
                avg_profit_margin: acc.profit_margin / n,
                avg_credit_score: acc.credit_score / n,
                avg_od_utilization: acc.od_utilization / n,
                interest_reduction_count: acc.eligible,
                interest_reduction_pct: round2(acc.eligible as f64 / n * 100.0),
                risk_rank: 0,
                segment_counts: segment_names.iter().cloned().zip(acc.segments).collect(),
            }
        })
        .collect();

    // BTreeMap iteration already orders names, so a stable sort breaks PD ties by name.
    sectors.sort_by(|a, b| a.avg_pd.partial_cmp(&b.avg_pd).unwrap_or(std::cmp::Ordering::Equal));
    for (index, sector) in sectors.iter_mut().enumerate() {
        sector.risk_rank = index + 1;
    }

    SectorReport {
        sectors,
        segment_names: segment_names.to_vec(),
        total_records: scored.len(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl SectorReport {
    pub fn rank_of(&self, business_type: &str) -> Option<usize> {
        self.sectors
            .iter()
            .find(|s| s.business_type == business_type)
            .map(|s| s.risk_rank)
    }

    /// Tabular form with one `Cluster_<name>` column per segment.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut columns = vec![
            Column::new("Business_Type".into(), self.collect(|s| s.business_type.clone())),
            Column::new("Count".into(), self.collect(|s| s.count as u64)),
            Column::new("Avg_PD".into(), self.collect(|s| s.avg_pd)),
            Column::new("Avg_ODScore".into(), self.collect(|s| s.avg_od_score)),
            Column::new("Avg_CashRatio".into(), self.collect(|s| s.avg_cash_ratio)),
            Column::new("Avg_Profit".into(), self.collect(|s| s.avg_profit)),
            Column::new("Avg_ProfitMargin".into(), self.collect(|s| s.avg_profit_margin)),
            Column::new("Avg_CreditScore".into(), self.collect(|s| s.avg_credit_score)),
            Column::new("Avg_OD_Utilization".into(), self.collect(|s| s.avg_od_utilization)),
            Column::new(
                "Interest_Reduction_Count".into(),
                self.collect(|s| s.interest_reduction_count as u64),
            ),
            Column::new(
                "Interest_Reduction_Pct".into(),
                self.collect(|s| s.interest_reduction_pct),
            ),
            Column::new("Risk_Rank".into(), self.collect(|s| s.risk_rank as u64)),
        ];
        for (index, name) in self.segment_names.iter().enumerate() {
            columns.push(Column::new(
                format!("Cluster_{}", name).into(),
                self.collect(|s| s.segment_counts.get(index).map(|(_, c)| *c as u64).unwrap_or(0)),
            ));
        }
        DataFrame::new(columns)
    }

    fn collect<T>(&self, f: impl Fn(&SectorSummary) -> T) -> Vec<T> {
        self.sectors.iter().map(f).collect()
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut df = self
            .to_dataframe()
            .context("Failed to build sector report table")?;
        let mut file = File::create(path)
            .with_context(|| format!("Failed to create report file: {}", path.display()))?;
        CsvWriter::new(&mut file)
            .finish(&mut df)
            .with_context(|| format!("Failed to write CSV report: {}", path.display()))?;
        Ok(())
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize sector report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write JSON report: {}", path.display()))?;
        Ok(())
    }

    pub fn display(&self) {
        println!();
        println!(
            "    {} {}",
            style("🏢").cyan(),
            style("SECTOR RISK RANKING (least to most risky)").white().bold()
        );
        println!("    {}", style("─".repeat(50)).dim());
        println!();

        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec![
            Cell::new("Rank").add_attribute(Attribute::Bold),
            Cell::new("Sector").add_attribute(Attribute::Bold),
            Cell::new("Count").add_attribute(Attribute::Bold),
            Cell::new("Avg PD").add_attribute(Attribute::Bold),
            Cell::new("Avg ODScore").add_attribute(Attribute::Bold),
            Cell::new("Avg CashRatio").add_attribute(Attribute::Bold),
            Cell::new("Avg Credit").add_attribute(Attribute::Bold),
            Cell::new("Rate Cut %").add_attribute(Attribute::Bold),
        ]);

        for sector in &self.sectors {
            let pd_color = if sector.avg_pd < 0.10 {
                Color::Green
            } else if sector.avg_pd < 0.30 {
                Color::Yellow
            } else {
                Color::Red
            };
            table.add_row(vec![
                Cell::new(format!("#{}", sector.risk_rank)).set_alignment(CellAlignment::Right),
                Cell::new(&sector.business_type),
                Cell::new(sector.count).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.4}", sector.avg_pd)).fg(pd_color),
                Cell::new(format!("{:.2}", sector.avg_od_score)),
                Cell::new(format!("{:.2}", sector.avg_cash_ratio)),
                Cell::new(format!("{:.0}", sector.avg_credit_score)),
                Cell::new(format!("{:.1}%", sector.interest_reduction_pct)),
            ]);
        }

        for line in table.to_string().lines() {
            println!("    {}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{engineer, RawField, RawFinancials, Record};

    fn scored(business_type: &str, pd: f64, segment_id: usize, eligible: bool) -> ScoredRecord {
        let mut raw = RawFinancials::from_values([1.0; RawField::COUNT]);
        raw.credit_score = 700.0;
        raw.od_required = 100.0;
        raw.cash_inflow = 200.0;
        let engineered = engineer(&Record::new("id", business_type, raw)).unwrap();
        ScoredRecord {
            od_score: (1.0 - pd) * engineered.cash_ratio,
            engineered,
            probability_of_default: pd,
            segment_id,
            segment_name: String::new(),
            interest_eligible: eligible,
        }
    }

    fn names() -> Vec<String> {
        vec!["Stable".to_string(), "High Risk".to_string()]
    }

    #[test]
    fn test_rank_follows_mean_pd() {
        let records = vec![
            scored("Retail", 0.05, 0, true),
            scored("Manufacturing", 0.20, 1, false),
            scored("Services", 0.12, 0, false),
        ];
        let report = analyze_sectors(&records, &names());

        assert_eq!(report.rank_of("Retail"), Some(1));
        assert_eq!(report.rank_of("Services"), Some(2));
        assert_eq!(report.rank_of("Manufacturing"), Some(3));
        assert_eq!(report.sectors[0].business_type, "Retail");
    }

    #[test]
    fn test_equal_pd_ranks_by_name() {
        let records = vec![scored("Zeta", 0.1, 0, false), scored("Alpha", 0.1, 0, false)];
        let report = analyze_sectors(&records, &names());
        assert_eq!(report.rank_of("Alpha"), Some(1));
        assert_eq!(report.rank_of("Zeta"), Some(2));
    }

    #[test]
    fn test_aggregates_and_percentages() {
        let records = vec![
            scored("Retail", 0.10, 0, true),
            scored("Retail", 0.20, 1, false),
            scored("Retail", 0.30, 1, false),
        ];
        let report = analyze_sectors(&records, &names());
        let retail = &report.sectors[0];

        assert_eq!(retail.count, 3);
        assert!((retail.avg_pd - 0.20).abs() < 1e-12);
        assert!((retail.avg_cash_ratio - 2.0).abs() < 1e-12);
        assert_eq!(retail.interest_reduction_count, 1);
        assert_eq!(retail.interest_reduction_pct, 33.33);
        assert_eq!(
            retail.segment_counts,
            vec![("Stable".to_string(), 1), ("High Risk".to_string(), 2)]
        );
    }

    #[test]
    fn test_dataframe_has_segment_columns() {
        let report = analyze_sectors(&[scored("Retail", 0.1, 1, false)], &names());
        let df = report.to_dataframe().unwrap();
        assert_eq!(df.height(), 1);
        assert!(df.column("Cluster_High Risk").is_ok());
        assert!(df.column("Risk_Rank").is_ok());
    }
}
