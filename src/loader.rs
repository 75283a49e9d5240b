#![cfg(not(tarpaulin_include))]

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::grid::RowData;

/// Errors raised while reading a CSV upload
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("CSV file is empty")]
    Empty,

    #[error("CSV header row has no columns")]
    NoHeaders,

    #[error("unterminated quoted field starting on line {0}")]
    UnterminatedQuote(usize),

    #[error("failed to read CSV file: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV file is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// A CSV file turned into grid rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCsv {
    /// Name of the uploaded file
    pub original_name: String,
    pub column_headers: Vec<String>,
    pub rows: Vec<RowData>,
}

impl ParsedCsv {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Parse CSV text into header-keyed rows
///
/// The first record is the header row. Each following record maps header
/// to value; short records are padded with empty strings and records whose
/// cells are all blank are skipped.
///
/// # Examples
/// ```
/// use batchsheet::loader::parse_csv;
///
/// let parsed = parse_csv("people.csv", "name,age\nAlice,30\n,\nBob,25\n").unwrap();
/// assert_eq!(parsed.column_headers, vec!["name", "age"]);
/// assert_eq!(parsed.row_count(), 2);
/// assert_eq!(parsed.rows[1]["name"], "Bob");
/// ```
pub fn parse_csv(original_name: &str, content: &str) -> Result<ParsedCsv, LoadError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut records = parse_records(content)?.into_iter();

    let headers = records.next().ok_or(LoadError::Empty)?;
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(LoadError::NoHeaders);
    }

    let rows = records
        .filter(|record| record.iter().any(|cell| !cell.trim().is_empty()))
        .map(|record| {
            headers
                .iter()
                .enumerate()
                .map(|(i, header)| (header.clone(), record.get(i).cloned().unwrap_or_default()))
                .collect::<RowData>()
        })
        .collect();

    Ok(ParsedCsv {
        original_name: original_name.to_string(),
        column_headers: headers,
        rows,
    })
}

/// Parse CSV bytes, as received from an upload
pub fn parse_csv_bytes(original_name: &str, bytes: Vec<u8>) -> Result<ParsedCsv, LoadError> {
    let content = String::from_utf8(bytes)?;
    parse_csv(original_name, &content)
}

/// Load and parse a CSV file from disk
///
/// # Examples
/// ```no_run
/// use batchsheet::loader::from_csv;
///
/// match from_csv("data.csv") {
///     Ok(parsed) => println!("Loaded {} rows", parsed.row_count()),
///     Err(e) => eprintln!("Error loading CSV: {}", e),
/// }
/// ```
pub fn from_csv(filepath: impl AsRef<Path>) -> Result<ParsedCsv, LoadError> {
    let path = filepath.as_ref();
    let bytes = fs::read(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.csv");
    parse_csv_bytes(name, bytes)
}

// Split text into records of fields. Quoted fields may contain commas,
// newlines and doubled quotes.
fn parse_records(content: &str) -> Result<Vec<Vec<String>>, LoadError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quote_line = 0;
    let mut line = 1;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    // Double quote inside quoted field - add a single quote
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.is_empty() => {
                in_quotes = true;
                quote_line = line;
            }
            ',' if !in_quotes => {
                record.push(std::mem::take(&mut field));
            }
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' if !in_quotes => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
                line += 1;
            }
            _ => {
                if c == '\n' {
                    line += 1;
                }
                field.push(c);
            }
        }
    }

    if in_quotes {
        return Err(LoadError::UnterminatedQuote(quote_line));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    // Blank lines carry no cells at all
    records.retain(|r| !(r.len() == 1 && r[0].is_empty()));
    Ok(records)
}
