//! Record sources backed by CSV and Parquet files

use std::path::{Path, PathBuf};

use polars::prelude::*;

use super::error::{Result, ScoringError};
use super::record::{RawField, RawFinancials, Record};

pub const ID_COLUMN: &str = "Business_ID";
pub const TYPE_COLUMN: &str = "Business_Type";

/// Anything that can deliver a batch of records.
pub trait RecordSource {
    fn records(&self) -> Result<Vec<Record>>;

    /// Short human-readable origin, used in progress output.
    fn describe(&self) -> String;
}

/// Records read from a CSV (or Parquet) file.
#[derive(Debug, Clone)]
pub struct CsvRecordSource {
    path: PathBuf,
    infer_schema_length: Option<usize>,
}

impl CsvRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            infer_schema_length: Some(10_000),
        }
    }

    /// Rows scanned to infer CSV column types; `None` scans the whole file.
    pub fn with_infer_schema_length(mut self, rows: Option<usize>) -> Self {
        self.infer_schema_length = rows;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for CsvRecordSource {
    fn records(&self) -> Result<Vec<Record>> {
        let df = load_dataset(&self.path, self.infer_schema_length)?.collect()?;
        records_from_dataframe(&df)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Records already held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordSource {
    records: Vec<Record>,
}

impl MemoryRecordSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl RecordSource for MemoryRecordSource {
    fn records(&self) -> Result<Vec<Record>> {
        Ok(self.records.clone())
    }

    fn describe(&self) -> String {
        format!("{} in-memory record(s)", self.records.len())
    }
}

/// Open a dataset lazily (CSV or Parquet based on extension).
pub fn load_dataset(path: &Path, infer_schema_length: Option<usize>) -> Result<LazyFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let lf = match extension.as_str() {
        "csv" => LazyCsvReader::new(path)
            .with_infer_schema_length(infer_schema_length)
            .finish()?,
        "parquet" => LazyFrame::scan_parquet(path, Default::default())?,
        _ => {
            return Err(ScoringError::InvalidConfig(format!(
                "unsupported file format '{}' for {}; expected csv or parquet",
                extension,
                path.display()
            )))
        }
    };

    Ok(lf)
}

/// Convert a frame with the id, type and fifteen raw columns into records.
///
/// A missing column, null or non-finite cell fails with `MissingField`.
pub fn records_from_dataframe(df: &DataFrame) -> Result<Vec<Record>> {
    let ids = string_column(df, ID_COLUMN)?;
    let types = string_column(df, TYPE_COLUMN)?;

    let mut columns: Vec<Vec<Option<f64>>> = Vec::with_capacity(RawField::COUNT);
    for field in RawField::ALL {
        let name = field.column_name();
        let column = df.column(name).map_err(|_| missing_column(name))?;
        let values = column.cast(&DataType::Float64)?;
        columns.push(values.f64()?.iter().collect());
    }

    let mut records = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let business_id = match &ids[row] {
            Some(id) => id.clone(),
            None => {
                return Err(ScoringError::MissingField {
                    record: format!("row {}", row + 1),
                    field: ID_COLUMN.to_string(),
                })
            }
        };
        let business_type = types[row].clone().ok_or_else(|| ScoringError::MissingField {
            record: business_id.clone(),
            field: TYPE_COLUMN.to_string(),
        })?;

        let mut values = [0.0; RawField::COUNT];
        for (slot, (field, column)) in values.iter_mut().zip(RawField::ALL.iter().zip(&columns)) {
            *slot = match column[row] {
                Some(value) if value.is_finite() => value,
                _ => {
                    return Err(ScoringError::MissingField {
                        record: business_id,
                        field: field.column_name().to_string(),
                    })
                }
            };
        }

        records.push(Record::new(
            business_id,
            business_type,
            RawFinancials::from_values(values),
        ));
    }

    Ok(records)
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df.column(name).map_err(|_| missing_column(name))?;
    let values = column.cast(&DataType::String)?;
    Ok(values
        .str()?
        .iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

fn missing_column(name: &str) -> ScoringError {
    ScoringError::MissingField {
        record: "*".to_string(),
        field: name.to_string(),
    }
}
