//! Persisted batch and row records.

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::RowData;

/// Field name carrying the persisted row id inside grid rows
pub const ROW_ID_FIELD: &str = "id";

/// An uploaded CSV file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: u64,
    /// Name the user gave the batch
    pub file_name: String,
    /// Name of the uploaded file
    pub original_name: String,
    /// JSON-encoded ordered list of column ids
    pub column_headers: String,
    pub row_count: usize,
    pub uploaded_at: DateTime<Utc>,
}

impl Batch {
    /// Column ids in display order. A header list that does not parse
    /// yields no columns rather than an error.
    pub fn columns(&self) -> Vec<String> {
        decode_columns(&self.column_headers)
    }
}

/// Encodes a column list the way it is stored on a batch
pub fn encode_columns(columns: &[String]) -> String {
    serde_json::to_string(columns).unwrap_or_else(|_| "[]".to_string())
}

pub fn decode_columns(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str(raw) {
        Ok(columns) => columns,
        Err(e) => {
            warn!("ignoring malformed column header list {:?}: {}", raw, e);
            Vec::new()
        }
    }
}

/// One stored row of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRow {
    pub id: u64,
    pub batch_id: u64,
    pub row_index: u64,
    pub row_data: RowData,
}

impl BatchRow {
    /// The row as the grid sees it: its fields plus the row id
    pub fn to_grid_row(&self) -> RowData {
        let mut row = self.row_data.clone();
        row.insert(ROW_ID_FIELD.to_string(), self.id.to_string());
        row
    }
}

/// A batch about to be created from an upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBatch {
    pub file_name: String,
    pub original_name: String,
    pub column_headers: Vec<String>,
    pub rows: Vec<RowData>,
}

/// Replacement contents for a stored row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowUpdate {
    pub id: u64,
    pub row_data: RowData,
}

impl RowUpdate {
    /// Splits the id field out of a grid row
    pub fn from_grid_row(mut fields: RowData) -> Result<Self, ValidationError> {
        let raw = fields
            .remove(ROW_ID_FIELD)
            .ok_or(ValidationError::MissingRowId)?;
        let id = raw
            .trim()
            .parse()
            .map_err(|_| ValidationError::InvalidRowId(raw.clone()))?;
        Ok(RowUpdate {
            id,
            row_data: fields,
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(String),

    #[error("batch name is required")]
    MissingBatchName,

    #[error("row has no id")]
    MissingRowId,

    #[error("invalid row id: {0}")]
    InvalidRowId(String),
}

/// A new row must carry a non-blank value for every column
pub fn validate_new_row(columns: &[String], row: &RowData) -> Result<(), ValidationError> {
    for column in columns {
        let filled = row.get(column).is_some_and(|v| !v.trim().is_empty());
        if !filled {
            return Err(ValidationError::MissingField(column.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_headers_yield_no_columns() {
        assert!(decode_columns("not json").is_empty());
        assert!(decode_columns("").is_empty());
        assert_eq!(decode_columns("[\"a\",\"b\"]"), vec!["a", "b"]);
    }

    #[test]
    fn test_row_update_from_grid_row() {
        let mut row = RowData::new();
        row.insert("id".to_string(), "17".to_string());
        row.insert("name".to_string(), "Alice".to_string());
        let update = RowUpdate::from_grid_row(row).unwrap();
        assert_eq!(update.id, 17);
        assert!(!update.row_data.contains_key("id"));

        let mut bad = RowData::new();
        bad.insert("id".to_string(), "x".to_string());
        assert_eq!(
            RowUpdate::from_grid_row(bad),
            Err(ValidationError::InvalidRowId("x".to_string()))
        );
    }

    #[test]
    fn test_new_row_validation() {
        let columns = vec!["name".to_string(), "age".to_string()];
        let mut row = RowData::new();
        row.insert("name".to_string(), "Alice".to_string());
        row.insert("age".to_string(), "  ".to_string());
        assert_eq!(
            validate_new_row(&columns, &row),
            Err(ValidationError::MissingField("age".to_string()))
        );
        row.insert("age".to_string(), "30".to_string());
        assert!(validate_new_row(&columns, &row).is_ok());
    }
}
