#![cfg(not(tarpaulin_include))]

use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::batch::ROW_ID_FIELD;
use crate::grid::{Grid, RowData};
use crate::view::cell_value;

/// Which rows an export covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportScope {
    /// Every row passing the current filters
    #[default]
    All,
    Selected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No rows to export")]
    NoRows,

    #[error("No selected rows to export")]
    NoSelectedRows,

    #[error("too many columns for a worksheet: {0}")]
    TooManyColumns(usize),

    #[error("too many rows for a worksheet: {0}")]
    TooManyRows(usize),

    #[error("failed to build workbook: {0}")]
    Xlsx(#[from] XlsxError),
}

/// Columns written by an export: everything but the row id
pub fn export_columns(columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| c.as_str() != ROW_ID_FIELD)
        .cloned()
        .collect()
}

/// Picks the rows an export covers from a grid
///
/// Both scopes follow the grid's current filters and sort order.
pub fn rows_for_export(grid: &Grid, scope: ExportScope) -> Result<Vec<RowData>, ExportError> {
    match scope {
        ExportScope::All => {
            let rows = grid.get_all_filtered_rows();
            if rows.is_empty() {
                return Err(ExportError::NoRows);
            }
            Ok(rows)
        }
        ExportScope::Selected => {
            let rows = grid.get_selected_rows();
            if rows.is_empty() {
                return Err(ExportError::NoSelectedRows);
            }
            Ok(rows)
        }
    }
}

// Quote a value when it holds a comma, a quote or a line break
fn escape_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r')
    {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Convert rows to CSV text
///
/// The header row lists `columns` minus the row id field, in the given
/// order. Missing cells are written as empty fields.
///
/// # Arguments
/// * `columns` - Column ids in export order
/// * `rows` - Rows to write
///
/// # Examples
/// ```
/// use batchsheet::downloader::to_csv;
/// use batchsheet::grid::RowData;
///
/// let mut row = RowData::new();
/// row.insert("id".to_string(), "4".to_string());
/// row.insert("name".to_string(), "Smith, J".to_string());
/// let columns = vec!["id".to_string(), "name".to_string()];
/// assert_eq!(to_csv(&columns, &[row]), "name\n\"Smith, J\"\n");
/// ```
pub fn to_csv(columns: &[String], rows: &[RowData]) -> String {
    let columns = export_columns(columns);
    let mut csv_content = String::new();

    let header: Vec<String> = columns.iter().map(|c| escape_field(c)).collect();
    csv_content.push_str(&header.join(","));
    csv_content.push('\n');

    for row in rows {
        let line: Vec<String> = columns
            .iter()
            .map(|c| escape_field(cell_value(row, c)))
            .collect();
        csv_content.push_str(&line.join(","));
        csv_content.push('\n');
    }

    csv_content
}

/// Convert rows to an XLSX workbook
///
/// Cells are written as strings, with a bold header row. The row id field
/// is dropped as in [`to_csv`].
pub fn to_xlsx(columns: &[String], rows: &[RowData]) -> Result<Vec<u8>, ExportError> {
    let columns = export_columns(columns);
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();

    u16::try_from(columns.len()).map_err(|_| ExportError::TooManyColumns(columns.len()))?;
    u32::try_from(rows.len()).map_err(|_| ExportError::TooManyRows(rows.len()))?;

    for (c, column) in columns.iter().enumerate() {
        let col = u16::try_from(c).map_err(|_| ExportError::TooManyColumns(columns.len()))?;
        worksheet.write_string_with_format(0, col, column.as_str(), &bold)?;
    }

    for (r, row) in rows.iter().enumerate() {
        let row_num = u32::try_from(r + 1).map_err(|_| ExportError::TooManyRows(rows.len()))?;
        for (c, column) in columns.iter().enumerate() {
            let value = cell_value(row, column);
            if !value.is_empty() {
                let col =
                    u16::try_from(c).map_err(|_| ExportError::TooManyColumns(columns.len()))?;
                worksheet.write_string(row_num, col, value)?;
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Exports a grid's rows in the requested format
pub fn export_grid(
    grid: &Grid,
    scope: ExportScope,
    format: ExportFormat,
) -> Result<Vec<u8>, ExportError> {
    let rows = rows_for_export(grid, scope)?;
    let columns = grid.column_order();
    match format {
        ExportFormat::Csv => Ok(to_csv(columns, &rows).into_bytes()),
        ExportFormat::Xlsx => to_xlsx(columns, &rows),
    }
}

/// File name for a download, derived from the batch name
pub fn export_file_name(batch_name: &str, format: ExportFormat) -> String {
    let stem: String = batch_name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = if stem.is_empty() { "export".to_string() } else { stem };
    format!("{}.{}", stem, format.extension())
}
