//! Score derivation from the classifier output
//!
//! Pure functions: OD suitability, interest-reduction eligibility and the two
//! PD bandings (simulator risk level and four-band display). The bandings use
//! independent cut points and are never interchangeable.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::config::{DisplayBands, RiskBands};

/// `(1 - PD) * CashRatio`; unbounded above.
pub fn od_score(probability_of_default: f64, cash_ratio: f64) -> f64 {
    (1.0 - probability_of_default) * cash_ratio
}

/// Eligible for interest reduction when PD is strictly below `pd_threshold`
/// and OD utilisation strictly above `od_util_threshold`.
pub fn interest_eligible(
    probability_of_default: f64,
    od_utilization: f64,
    pd_threshold: f64,
    od_util_threshold: f64,
) -> bool {
    probability_of_default < pd_threshold && od_utilization > od_util_threshold
}

/// Simulator risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn classify(probability_of_default: f64, bands: &RiskBands) -> Self {
        if probability_of_default < bands.medium_from {
            RiskLevel::Low
        } else if probability_of_default < bands.high_from {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        };
        f.write_str(label)
    }
}

/// Four-band PD display grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayBand {
    VeryLow,
    Low,
    Medium,
    High,
}

impl DisplayBand {
    pub fn classify(probability_of_default: f64, bands: &DisplayBands) -> Self {
        if probability_of_default < bands.low_from {
            DisplayBand::VeryLow
        } else if probability_of_default < bands.medium_from {
            DisplayBand::Low
        } else if probability_of_default < bands.high_from {
            DisplayBand::Medium
        } else {
            DisplayBand::High
        }
    }
}

impl fmt::Display for DisplayBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DisplayBand::VeryLow => "Very Low",
            DisplayBand::Low => "Low",
            DisplayBand::Medium => "Medium",
            DisplayBand::High => "High",
        };
        f.write_str(label)
    }
}
