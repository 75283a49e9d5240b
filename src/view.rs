//! View derivation: filter, then sort, then paginate.
//!
//! Everything here works on original row indices so the grid can keep
//! addressing edits by a row's position in the seeded data while the user
//! looks at a filtered and sorted page of it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::grid::RowData;

/// Sort direction for the active sort column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// The single active sort key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

/// Page index and page size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page_index: usize,
    pub page_size: usize,
}

impl Pagination {
    pub fn new(page_size: usize) -> Self {
        Pagination {
            page_index: 0,
            page_size: page_size.max(1),
        }
    }

    /// Half-open range of positions in the filtered sequence shown on the current page
    pub fn bounds(&self, total: usize) -> (usize, usize) {
        let start = (self.page_index * self.page_size).min(total);
        let end = ((self.page_index + 1) * self.page_size).min(total);
        (start, end)
    }
}

/// Number of pages needed for `total` rows; zero rows means zero pages
pub fn page_count(total: usize, page_size: usize) -> usize {
    total.div_ceil(page_size.max(1))
}

/// Sort, filter and pagination state of a grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    pub sort: Option<SortSpec>,
    pub column_filters: BTreeMap<String, String>,
    pub global_filter: String,
    pub pagination: Pagination,
}

impl ViewState {
    pub fn new(page_size: usize) -> Self {
        ViewState {
            sort: None,
            column_filters: BTreeMap::new(),
            global_filter: String::new(),
            pagination: Pagination::new(page_size),
        }
    }

    pub fn has_filters(&self) -> bool {
        !self.global_filter.is_empty() || !self.column_filters.is_empty()
    }

    /// Drops sort and filters that refer to columns no longer present
    pub fn retain_columns(&mut self, columns: &[String]) {
        self.column_filters
            .retain(|column, _| columns.iter().any(|c| c == column));
        if let Some(sort) = &self.sort {
            if !columns.iter().any(|c| *c == sort.column) {
                self.sort = None;
            }
        }
    }

    /// Cycles the sort on `column`: none, ascending, descending, none.
    /// Sorting a different column replaces the current sort.
    pub fn toggle_sort(&mut self, column: &str) {
        self.sort = match self.sort.take() {
            Some(SortSpec {
                column: current,
                direction: SortDirection::Asc,
            }) if current == column => Some(SortSpec {
                column: current,
                direction: SortDirection::Desc,
            }),
            Some(SortSpec {
                column: current,
                direction: SortDirection::Desc,
            }) if current == column => None,
            _ => Some(SortSpec {
                column: column.to_string(),
                direction: SortDirection::Asc,
            }),
        };
    }
}

/// Value of `column` in `row`, missing fields read as empty
pub fn cell_value<'a>(row: &'a RowData, column: &str) -> &'a str {
    row.get(column).map(String::as_str).unwrap_or("")
}

/// Case-insensitive substring match; an empty needle matches everything
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Whether `row` passes every column filter and the global filter
pub fn row_matches(row: &RowData, columns: &[String], view: &ViewState) -> bool {
    let columns_ok = view
        .column_filters
        .iter()
        .all(|(column, needle)| contains_ignore_case(cell_value(row, column), needle));
    if !columns_ok {
        return false;
    }

    view.global_filter.is_empty()
        || columns
            .iter()
            .any(|column| contains_ignore_case(cell_value(row, column), &view.global_filter))
}

/// Original indices of the rows that pass the filters, in input order
pub fn filter_rows(rows: &[RowData], columns: &[String], view: &ViewState) -> Vec<usize> {
    rows.iter()
        .enumerate()
        .filter(|(_, row)| row_matches(row, columns, view))
        .map(|(index, _)| index)
        .collect()
}

/// Stable sort of `indices` by the active sort key
pub fn sort_rows(rows: &[RowData], indices: &mut [usize], sort: Option<&SortSpec>) {
    let Some(sort) = sort else {
        return;
    };

    indices.sort_by(|&a, &b| {
        let left = cell_value(&rows[a], &sort.column);
        let right = cell_value(&rows[b], &sort.column);
        match sort.direction {
            SortDirection::Asc => compare_alphanumeric(left, right),
            SortDirection::Desc => compare_alphanumeric(right, left),
        }
    });
}

/// Filter then sort; the full display order across all pages
pub fn display_order(rows: &[RowData], columns: &[String], view: &ViewState) -> Vec<usize> {
    let mut indices = filter_rows(rows, columns, view);
    sort_rows(rows, &mut indices, view.sort.as_ref());
    indices
}

/// Natural ordering: runs of digits compare by numeric value, everything
/// else compares case-insensitively as text.
pub fn compare_alphanumeric(a: &str, b: &str) -> Ordering {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let mut left = split_digit_runs(&a).into_iter();
    let mut right = split_digit_runs(&b).into_iter();

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = if is_digits(x) && is_digits(y) {
                    compare_digit_runs(x, y)
                } else {
                    x.cmp(y)
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

// Leading zeros are ignored, then the longer run is larger
fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn split_digit_runs(s: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut in_digits = None;

    for (i, c) in s.char_indices() {
        let digit = c.is_ascii_digit();
        match in_digits {
            Some(prev) if prev != digit => {
                runs.push(&s[start..i]);
                start = i;
            }
            _ => {}
        }
        in_digits = Some(digit);
    }
    if start < s.len() {
        runs.push(&s[start..]);
    }
    runs
}
