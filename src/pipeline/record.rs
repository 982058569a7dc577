//! Raw business records
//!
//! A [`Record`] is one business observation: an identifier, a sector and the
//! fifteen raw financial fields the pipeline consumes.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{Result, ScoringError};

/// The fifteen raw numeric fields of a record, in dataset column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RawField {
    RevenuePerDay,
    ExpensePerDay,
    MonthlyRevenue,
    MonthlyExpense,
    CashInflow,
    CashOutflow,
    OdRequired,
    OdUtilization,
    InventoryDays,
    ReceivableDays,
    PayableDays,
    CashConversionCycle,
    CreditScore,
    DebtToRevenueRatio,
    EmiObligation,
}

impl RawField {
    pub const COUNT: usize = 15;

    pub const ALL: [RawField; Self::COUNT] = [
        RawField::RevenuePerDay,
        RawField::ExpensePerDay,
        RawField::MonthlyRevenue,
        RawField::MonthlyExpense,
        RawField::CashInflow,
        RawField::CashOutflow,
        RawField::OdRequired,
        RawField::OdUtilization,
        RawField::InventoryDays,
        RawField::ReceivableDays,
        RawField::PayableDays,
        RawField::CashConversionCycle,
        RawField::CreditScore,
        RawField::DebtToRevenueRatio,
        RawField::EmiObligation,
    ];

    /// Column name used in source files and feature lists.
    pub const fn column_name(self) -> &'static str {
        match self {
            RawField::RevenuePerDay => "Revenue_per_Day",
            RawField::ExpensePerDay => "Expense_per_Day",
            RawField::MonthlyRevenue => "Monthly_Revenue",
            RawField::MonthlyExpense => "Monthly_Expense",
            RawField::CashInflow => "Cash_Inflow_Adjusted",
            RawField::CashOutflow => "Cash_Outflow_Adjusted",
            RawField::OdRequired => "OD_Required",
            RawField::OdUtilization => "OD_Utilization",
            RawField::InventoryDays => "Inventory_Days",
            RawField::ReceivableDays => "Receivable_Days",
            RawField::PayableDays => "Payable_Days",
            RawField::CashConversionCycle => "Cash_Conversion_Cycle",
            RawField::CreditScore => "Credit_Score",
            RawField::DebtToRevenueRatio => "Debt_to_Revenue_Ratio",
            RawField::EmiObligation => "EMI_Obligation",
        }
    }
}

impl fmt::Display for RawField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

impl FromStr for RawField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RawField::ALL
            .iter()
            .copied()
            .find(|field| field.column_name() == s)
            .ok_or_else(|| format!("Unknown raw field: '{}'", s))
    }
}

/// Raw financial fields of one business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFinancials {
    #[serde(rename = "Revenue_per_Day")]
    pub revenue_per_day: f64,
    #[serde(rename = "Expense_per_Day")]
    pub expense_per_day: f64,
    #[serde(rename = "Monthly_Revenue")]
    pub monthly_revenue: f64,
    #[serde(rename = "Monthly_Expense")]
    pub monthly_expense: f64,
    #[serde(rename = "Cash_Inflow_Adjusted")]
    pub cash_inflow: f64,
    #[serde(rename = "Cash_Outflow_Adjusted")]
    pub cash_outflow: f64,
    #[serde(rename = "OD_Required")]
    pub od_required: f64,
    #[serde(rename = "OD_Utilization")]
    pub od_utilization: f64,
    #[serde(rename = "Inventory_Days")]
    pub inventory_days: f64,
    #[serde(rename = "Receivable_Days")]
    pub receivable_days: f64,
    #[serde(rename = "Payable_Days")]
    pub payable_days: f64,
    #[serde(rename = "Cash_Conversion_Cycle")]
    pub cash_conversion_cycle: f64,
    #[serde(rename = "Credit_Score")]
    pub credit_score: f64,
    #[serde(rename = "Debt_to_Revenue_Ratio")]
    pub debt_to_revenue_ratio: f64,
    #[serde(rename = "EMI_Obligation")]
    pub emi_obligation: f64,
}

impl RawFinancials {
    pub fn get(&self, field: RawField) -> f64 {
        match field {
            RawField::RevenuePerDay => self.revenue_per_day,
            RawField::ExpensePerDay => self.expense_per_day,
            RawField::MonthlyRevenue => self.monthly_revenue,
            RawField::MonthlyExpense => self.monthly_expense,
            RawField::CashInflow => self.cash_inflow,
            RawField::CashOutflow => self.cash_outflow,
            RawField::OdRequired => self.od_required,
            RawField::OdUtilization => self.od_utilization,
            RawField::InventoryDays => self.inventory_days,
            RawField::ReceivableDays => self.receivable_days,
            RawField::PayableDays => self.payable_days,
            RawField::CashConversionCycle => self.cash_conversion_cycle,
            RawField::CreditScore => self.credit_score,
            RawField::DebtToRevenueRatio => self.debt_to_revenue_ratio,
            RawField::EmiObligation => self.emi_obligation,
        }
    }

    fn set(&mut self, field: RawField, value: f64) {
        let slot = match field {
            RawField::RevenuePerDay => &mut self.revenue_per_day,
            RawField::ExpensePerDay => &mut self.expense_per_day,
            RawField::MonthlyRevenue => &mut self.monthly_revenue,
            RawField::MonthlyExpense => &mut self.monthly_expense,
            RawField::CashInflow => &mut self.cash_inflow,
            RawField::CashOutflow => &mut self.cash_outflow,
            RawField::OdRequired => &mut self.od_required,
            RawField::OdUtilization => &mut self.od_utilization,
            RawField::InventoryDays => &mut self.inventory_days,
            RawField::ReceivableDays => &mut self.receivable_days,
            RawField::PayableDays => &mut self.payable_days,
            RawField::CashConversionCycle => &mut self.cash_conversion_cycle,
            RawField::CreditScore => &mut self.credit_score,
            RawField::DebtToRevenueRatio => &mut self.debt_to_revenue_ratio,
            RawField::EmiObligation => &mut self.emi_obligation,
        };
        *slot = value;
    }

    /// Build from an ordered array of values matching [`RawField::ALL`].
    pub fn from_values(values: [f64; RawField::COUNT]) -> Self {
        let mut raw = Self::zeroed();
        for (field, value) in RawField::ALL.iter().zip(values) {
            raw.set(*field, value);
        }
        raw
    }

    /// Values in [`RawField::ALL`] order.
    pub fn values(&self) -> [f64; RawField::COUNT] {
        RawField::ALL.map(|field| self.get(field))
    }

    fn zeroed() -> Self {
        Self {
            revenue_per_day: 0.0,
            expense_per_day: 0.0,
            monthly_revenue: 0.0,
            monthly_expense: 0.0,
            cash_inflow: 0.0,
            cash_outflow: 0.0,
            od_required: 0.0,
            od_utilization: 0.0,
            inventory_days: 0.0,
            receivable_days: 0.0,
            payable_days: 0.0,
            cash_conversion_cycle: 0.0,
            credit_score: 0.0,
            debt_to_revenue_ratio: 0.0,
            emi_obligation: 0.0,
        }
    }
}

/// One business observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Business_ID")]
    pub business_id: String,
    #[serde(rename = "Business_Type")]
    pub business_type: String,
    #[serde(flatten)]
    pub raw: RawFinancials,
}

impl Record {
    pub fn new(
        business_id: impl Into<String>,
        business_type: impl Into<String>,
        raw: RawFinancials,
    ) -> Self {
        Self {
            business_id: business_id.into(),
            business_type: business_type.into(),
            raw,
        }
    }

    /// Build a record from a `column name -> value` map.
    ///
    /// Every raw field must be present and finite; nothing is defaulted.
    pub fn from_map(
        business_id: impl Into<String>,
        business_type: impl Into<String>,
        values: &HashMap<String, f64>,
    ) -> Result<Self> {
        let business_id = business_id.into();
        let mut raw = RawFinancials::zeroed();

        for field in RawField::ALL {
            match values.get(field.column_name()) {
                Some(value) if value.is_finite() => raw.set(field, *value),
                _ => {
                    return Err(ScoringError::MissingField {
                        record: business_id,
                        field: field.column_name().to_string(),
                    })
                }
            }
        }

        Ok(Self {
            business_id,
            business_type: business_type.into(),
            raw,
        })
    }

    /// Fail with `MissingField` on the first non-finite raw value.
    pub fn ensure_complete(&self) -> Result<()> {
        match RawField::ALL
            .iter()
            .find(|field| !self.raw.get(**field).is_finite())
        {
            Some(field) => Err(ScoringError::MissingField {
                record: self.business_id.clone(),
                field: field.column_name().to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> HashMap<String, f64> {
        RawField::ALL
            .iter()
            .enumerate()
            .map(|(i, field)| (field.column_name().to_string(), i as f64 + 1.0))
            .collect()
    }

    #[test]
    fn test_field_names_round_trip() {
        for field in RawField::ALL {
            assert_eq!(field.column_name().parse::<RawField>().unwrap(), field);
        }
        assert!("Business_Type".parse::<RawField>().is_err());
    }

    #[test]
    fn test_from_map_reads_every_field() {
        let record = Record::from_map("B-1", "Retail", &sample_map()).unwrap();
        assert_eq!(record.raw.revenue_per_day, 1.0);
        assert_eq!(record.raw.emi_obligation, 15.0);
        assert_eq!(record.raw.values()[6], record.raw.od_required);
    }

    #[test]
    fn test_from_map_rejects_missing_field() {
        let mut values = sample_map();
        values.remove("Credit_Score");

        let err = Record::from_map("B-2", "Retail", &values).unwrap_err();
        match err {
            ScoringError::MissingField { record, field } => {
                assert_eq!(record, "B-2");
                assert_eq!(field, "Credit_Score");
            }
            other => panic!("Expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_from_map_rejects_nan() {
        let mut values = sample_map();
        values.insert("OD_Utilization".to_string(), f64::NAN);
        assert!(Record::from_map("B-3", "Retail", &values).is_err());
    }

    #[test]
    fn test_ensure_complete_flags_infinite_value() {
        let mut raw = RawFinancials::from_values([1.0; RawField::COUNT]);
        raw.cash_inflow = f64::INFINITY;
        let record = Record::new("B-4", "Services", raw);
        let err = record.ensure_complete().unwrap_err();
        assert!(err.to_string().contains("Cash_Inflow_Adjusted"));
    }
}
