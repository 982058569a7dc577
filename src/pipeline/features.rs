//! Feature engineering and the ordered feature schema
//!
//! Derives the engineered fields from a raw [`Record`] and turns engineered
//! records into feature vectors whose column order is fixed by a
//! [`FeatureSchema`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{Result, ScoringError};
use super::record::{RawField, Record};

/// Cash ratio assigned when a business requires no overdraft.
///
/// Treated as authoritative: such a business is maximally cash-safe.
pub const NO_OVERDRAFT_CASH_RATIO: f64 = 10.0;

/// A record extended with the derived financial indicators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineeredRecord {
    pub record: Record,
    /// Monthly revenue minus monthly expense.
    pub profit: f64,
    /// Profit over monthly revenue; 0 when revenue is 0.
    pub profit_margin: f64,
    /// Cash inflow over OD requirement; [`NO_OVERDRAFT_CASH_RATIO`] when no OD is required.
    pub cash_ratio: f64,
    /// Inventory days + receivable days - payable days.
    pub cash_conversion_cycle: f64,
}

/// Derive the engineered fields for one record.
pub fn engineer(record: &Record) -> Result<EngineeredRecord> {
    record.ensure_complete()?;
    let raw = &record.raw;

    let profit = raw.monthly_revenue - raw.monthly_expense;
    let profit_margin = if raw.monthly_revenue != 0.0 {
        profit / raw.monthly_revenue
    } else {
        0.0
    };
    let cash_ratio = if raw.od_required > 0.0 {
        raw.cash_inflow / raw.od_required
    } else {
        NO_OVERDRAFT_CASH_RATIO
    };
    let cash_conversion_cycle = raw.inventory_days + raw.receivable_days - raw.payable_days;

    Ok(EngineeredRecord {
        record: record.clone(),
        profit,
        profit_margin,
        cash_ratio,
        cash_conversion_cycle,
    })
}

/// Engineer a batch, failing on the first malformed record.
pub fn engineer_all(records: &[Record]) -> Result<Vec<EngineeredRecord>> {
    records.iter().map(engineer).collect()
}

/// A feature the pipeline can be configured to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureName {
    Raw(RawField),
    Profit,
    ProfitMargin,
    CashRatio,
    CccCalculated,
}

impl FeatureName {
    const ENGINEERED: [FeatureName; 4] = [
        FeatureName::Profit,
        FeatureName::ProfitMargin,
        FeatureName::CashRatio,
        FeatureName::CccCalculated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureName::Raw(field) => field.column_name(),
            FeatureName::Profit => "Profit",
            FeatureName::ProfitMargin => "ProfitMargin",
            FeatureName::CashRatio => "CashRatio",
            FeatureName::CccCalculated => "CCC_Calculated",
        }
    }

    /// Read this feature's value from an engineered record.
    pub fn value(&self, engineered: &EngineeredRecord) -> f64 {
        match self {
            FeatureName::Raw(field) => engineered.record.raw.get(*field),
            FeatureName::Profit => engineered.profit,
            FeatureName::ProfitMargin => engineered.profit_margin,
            FeatureName::CashRatio => engineered.cash_ratio,
            FeatureName::CccCalculated => engineered.cash_conversion_cycle,
        }
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(field) = s.parse::<RawField>() {
            return Ok(FeatureName::Raw(field));
        }
        FeatureName::ENGINEERED
            .iter()
            .copied()
            .find(|feature| feature.as_str() == s)
            .ok_or_else(|| format!("Unknown feature: '{}'", s))
    }
}

/// The reference feature list: the 15 raw fields followed by Profit,
/// ProfitMargin and CashRatio.
pub fn reference_features() -> Vec<String> {
    RawField::ALL
        .iter()
        .map(|field| field.column_name().to_string())
        .chain(
            [FeatureName::Profit, FeatureName::ProfitMargin, FeatureName::CashRatio]
                .iter()
                .map(|feature| feature.as_str().to_string()),
        )
        .collect()
}

/// Ordered, validated list of features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    names: Vec<String>,
    features: Vec<FeatureName>,
}

impl FeatureSchema {
    pub fn new(names: &[String]) -> Result<Self> {
        if names.is_empty() {
            return Err(ScoringError::InvalidConfig(
                "feature list must not be empty".to_string(),
            ));
        }

        let mut features = Vec::with_capacity(names.len());
        for name in names {
            let feature = name
                .parse::<FeatureName>()
                .map_err(ScoringError::InvalidConfig)?;
            if features.contains(&feature) {
                return Err(ScoringError::InvalidConfig(format!(
                    "feature '{}' listed more than once",
                    name
                )));
            }
            features.push(feature);
        }

        Ok(Self {
            names: names.to_vec(),
            features,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Build the feature vector for one engineered record.
    pub fn vector(&self, engineered: &EngineeredRecord) -> FeatureVector {
        FeatureVector {
            names: self.names.clone(),
            values: self.row(engineered),
        }
    }

    /// Build the feature matrix for a batch of engineered records.
    pub fn matrix(&self, engineered: &[EngineeredRecord]) -> FeatureMatrix {
        FeatureMatrix {
            names: self.names.clone(),
            rows: engineered.iter().map(|e| self.row(e)).collect(),
        }
    }

    fn row(&self, engineered: &EngineeredRecord) -> Vec<f64> {
        self.features.iter().map(|f| f.value(engineered)).collect()
    }
}

/// One feature vector, tagged with the names of its columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub names: Vec<String>,
    pub values: Vec<f64>,
}

impl From<FeatureVector> for FeatureMatrix {
    fn from(vector: FeatureVector) -> Self {
        FeatureMatrix {
            names: vector.names,
            rows: vec![vector.values],
        }
    }
}

/// A batch of feature vectors sharing one column order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Every row must have one value per name.
    pub fn new(names: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if let Some(row) = rows.iter().find(|row| row.len() != names.len()) {
            return Err(ScoringError::DimensionMismatch {
                stage: "feature matrix",
                expected: names.len(),
                actual: row.len(),
            });
        }
        Ok(Self { names, rows })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Values of column `index` across all rows.
    pub fn column(&self, index: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(move |row| row[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::record::RawFinancials;

    fn record_with(monthly_revenue: f64, monthly_expense: f64, od_required: f64) -> Record {
        let mut raw = RawFinancials::from_values([1.0; RawField::COUNT]);
        raw.monthly_revenue = monthly_revenue;
        raw.monthly_expense = monthly_expense;
        raw.od_required = od_required;
        raw.cash_inflow = 500_000.0;
        raw.inventory_days = 35.0;
        raw.receivable_days = 40.0;
        raw.payable_days = 30.0;
        Record::new("B-1", "Retail", raw)
    }

    #[test]
    fn test_engineered_values() {
        let engineered = engineer(&record_with(750_000.0, 540_000.0, 250_000.0)).unwrap();
        assert!((engineered.profit - 210_000.0).abs() < 1e-9);
        assert!((engineered.profit_margin - 0.28).abs() < 1e-12);
        assert!((engineered.cash_ratio - 2.0).abs() < 1e-12);
        assert_eq!(engineered.cash_conversion_cycle, 45.0);
    }

    #[test]
    fn test_zero_revenue_gives_zero_margin() {
        let engineered = engineer(&record_with(0.0, 1_000.0, 250_000.0)).unwrap();
        assert_eq!(engineered.profit, -1_000.0);
        assert_eq!(engineered.profit_margin, 0.0);
    }

    #[test]
    fn test_zero_od_required_uses_sentinel() {
        let engineered = engineer(&record_with(1_000.0, 500.0, 0.0)).unwrap();
        assert_eq!(engineered.cash_ratio, NO_OVERDRAFT_CASH_RATIO);
    }

    #[test]
    fn test_reference_features() {
        let features = reference_features();
        assert_eq!(features.len(), 18);
        assert_eq!(features[0], "Revenue_per_Day");
        assert_eq!(features[14], "EMI_Obligation");
        assert_eq!(&features[15..], &["Profit", "ProfitMargin", "CashRatio"]);
    }

    #[test]
    fn test_schema_rejects_unknown_and_duplicate_features() {
        let unknown = vec!["Profit".to_string(), "Vibes".to_string()];
        assert!(FeatureSchema::new(&unknown).is_err());

        let duplicate = vec!["Profit".to_string(), "Profit".to_string()];
        assert!(FeatureSchema::new(&duplicate).is_err());
    }

    #[test]
    fn test_vector_follows_schema_order() {
        let names = vec![
            "CashRatio".to_string(),
            "OD_Required".to_string(),
            "CCC_Calculated".to_string(),
        ];
        let schema = FeatureSchema::new(&names).unwrap();
        let engineered = engineer(&record_with(750_000.0, 540_000.0, 250_000.0)).unwrap();

        let vector = schema.vector(&engineered);
        assert_eq!(vector.names, names);
        assert_eq!(vector.values, vec![2.0, 250_000.0, 45.0]);
    }

    #[test]
    fn test_matrix_rejects_ragged_rows() {
        let names = vec!["a".to_string(), "b".to_string()];
        let result = FeatureMatrix::new(names, vec![vec![1.0, 2.0], vec![3.0]]);
        assert!(result.is_err());
    }
}
