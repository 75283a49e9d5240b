//! Arrow-key movement of the active cell.
//!
//! The active cell is addressed by its row on the current page and its
//! column id. Moving past the last row of a page turns to the next page,
//! moving before the first row turns back; there is no wraparound at the
//! first or last page.

use serde::{Deserialize, Serialize};

use crate::columns::SELECT_COLUMN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavKey {
    Left,
    Right,
    Up,
    Down,
}

impl NavKey {
    /// Maps DOM-style key names (`ArrowLeft`, ...) to navigation keys
    pub fn from_key_name(name: &str) -> Option<Self> {
        match name {
            "ArrowLeft" => Some(NavKey::Left),
            "ArrowRight" => Some(NavKey::Right),
            "ArrowUp" => Some(NavKey::Up),
            "ArrowDown" => Some(NavKey::Down),
            _ => None,
        }
    }
}

/// The cell in edit mode: display row on the current page plus column id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCell {
    pub row: usize,
    pub column: String,
}

impl ActiveCell {
    pub fn new(row: usize, column: impl Into<String>) -> Self {
        ActiveCell {
            row,
            column: column.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTurn {
    Stay,
    Next,
    Previous,
}

/// What the navigator needs to know about the current page
#[derive(Debug, Clone, Copy)]
pub struct NavContext<'a> {
    /// Visible data columns in display order, select column excluded
    pub columns: &'a [String],
    pub rows_on_page: usize,
    pub page_size: usize,
    pub can_next_page: bool,
    pub can_previous_page: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavMove {
    pub turn: PageTurn,
    pub cell: ActiveCell,
}

impl NavMove {
    fn stay(row: usize, column: &str) -> Self {
        NavMove {
            turn: PageTurn::Stay,
            cell: ActiveCell::new(row, column),
        }
    }

    fn turn(turn: PageTurn, row: usize, column: &str) -> Self {
        NavMove {
            turn,
            cell: ActiveCell::new(row, column),
        }
    }
}

/// Computes where `key` moves the active cell, or `None` when the key is a
/// no-op at this position.
pub fn navigate(ctx: &NavContext<'_>, from: &ActiveCell, key: NavKey) -> Option<NavMove> {
    if from.column == SELECT_COLUMN {
        return None;
    }
    let first = ctx.columns.first()?;
    let last = ctx.columns.last()?;
    let col_idx = ctx.columns.iter().position(|c| *c == from.column);
    let row = from.row;
    let last_slot = ctx.page_size.saturating_sub(1);
    let has_row_below = row + 1 < ctx.rows_on_page;

    match key {
        NavKey::Right => {
            let next_col = match col_idx {
                Some(i) if i + 1 < ctx.columns.len() => Some(&ctx.columns[i + 1]),
                Some(_) => None,
                // A column that dropped out of view restarts at the first one
                None => Some(first),
            };
            if let Some(column) = next_col {
                Some(NavMove::stay(row, column))
            } else if has_row_below {
                Some(NavMove::stay(row + 1, first))
            } else if ctx.can_next_page {
                Some(NavMove::turn(PageTurn::Next, 0, first))
            } else {
                None
            }
        }
        NavKey::Left => match col_idx {
            Some(i) if i > 0 => Some(NavMove::stay(row, &ctx.columns[i - 1])),
            _ if row > 0 => Some(NavMove::stay(row - 1, last)),
            _ if ctx.can_previous_page => Some(NavMove::turn(PageTurn::Previous, last_slot, last)),
            _ => None,
        },
        NavKey::Down => {
            if has_row_below {
                Some(NavMove::stay(row + 1, &from.column))
            } else if ctx.can_next_page {
                Some(NavMove::turn(PageTurn::Next, 0, &from.column))
            } else {
                None
            }
        }
        NavKey::Up => {
            if row > 0 {
                Some(NavMove::stay(row - 1, &from.column))
            } else if ctx.can_previous_page {
                Some(NavMove::turn(PageTurn::Previous, last_slot, &from.column))
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols() -> Vec<String> {
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    }

    fn ctx(columns: &[String], rows_on_page: usize, next: bool, prev: bool) -> NavContext<'_> {
        NavContext {
            columns,
            rows_on_page,
            page_size: 3,
            can_next_page: next,
            can_previous_page: prev,
        }
    }

    #[test]
    fn test_right_walks_columns_then_rows_then_pages() {
        let columns = cols();
        let c = ctx(&columns, 3, true, false);
        let m = navigate(&c, &ActiveCell::new(0, "a"), NavKey::Right).unwrap();
        assert_eq!(m, NavMove::stay(0, "b"));
        let m = navigate(&c, &ActiveCell::new(0, "c"), NavKey::Right).unwrap();
        assert_eq!(m, NavMove::stay(1, "a"));
        let m = navigate(&c, &ActiveCell::new(2, "c"), NavKey::Right).unwrap();
        assert_eq!(m, NavMove::turn(PageTurn::Next, 0, "a"));
    }

    #[test]
    fn test_left_from_first_cell_goes_to_previous_page_last_slot() {
        let columns = cols();
        let c = ctx(&columns, 3, false, true);
        let m = navigate(&c, &ActiveCell::new(0, "a"), NavKey::Left).unwrap();
        assert_eq!(m, NavMove::turn(PageTurn::Previous, 2, "c"));
        let m = navigate(&c, &ActiveCell::new(1, "a"), NavKey::Left).unwrap();
        assert_eq!(m, NavMove::stay(0, "c"));
    }

    #[test]
    fn test_vertical_moves_keep_column() {
        let columns = cols();
        let c = ctx(&columns, 2, true, true);
        assert_eq!(
            navigate(&c, &ActiveCell::new(0, "b"), NavKey::Down),
            Some(NavMove::stay(1, "b"))
        );
        assert_eq!(
            navigate(&c, &ActiveCell::new(1, "b"), NavKey::Down),
            Some(NavMove::turn(PageTurn::Next, 0, "b"))
        );
        assert_eq!(
            navigate(&c, &ActiveCell::new(0, "b"), NavKey::Up),
            Some(NavMove::turn(PageTurn::Previous, 2, "b"))
        );
    }

    #[test]
    fn test_no_wraparound_at_boundaries() {
        let columns = cols();
        let c = ctx(&columns, 2, false, false);
        assert_eq!(navigate(&c, &ActiveCell::new(1, "c"), NavKey::Right), None);
        assert_eq!(navigate(&c, &ActiveCell::new(0, "a"), NavKey::Left), None);
        assert_eq!(navigate(&c, &ActiveCell::new(1, "a"), NavKey::Down), None);
        assert_eq!(navigate(&c, &ActiveCell::new(0, "a"), NavKey::Up), None);
    }

    #[test]
    fn test_select_column_never_navigates() {
        let columns = cols();
        let c = ctx(&columns, 3, true, true);
        assert_eq!(
            navigate(&c, &ActiveCell::new(1, SELECT_COLUMN), NavKey::Down),
            None
        );
    }

    #[test]
    fn test_key_names() {
        assert_eq!(NavKey::from_key_name("ArrowUp"), Some(NavKey::Up));
        assert_eq!(NavKey::from_key_name("Enter"), None);
    }
}
