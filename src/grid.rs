//! The grid engine.
//!
//! A [`Grid`] owns a working copy of the rows it was seeded with and all
//! of the view state layered on top: filters, sort, pagination, column
//! order and visibility, the active cell, row selection and the set of
//! rows edited since the last save. Nothing here blocks or talks to the
//! network. Column reorders and saves are queued as [`GridEvent`]s that
//! the host drains with [`Grid::take_events`] and hands to a gateway.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::columns::{ColumnLayout, SELECT_COLUMN};
use crate::navigation::{self, ActiveCell, NavContext, NavKey, PageTurn};
use crate::selection::Selection;
use crate::view::{self, ViewState};

/// One row of string cells keyed by column id
pub type RowData = BTreeMap<String, String>;

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Host-supplied configuration. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridOptions {
    pub page_size: usize,
    /// Disables editing, selection and column dragging
    pub preview_only: bool,
    pub height: String,
    pub width: String,
}

impl Default for GridOptions {
    fn default() -> Self {
        GridOptions {
            page_size: DEFAULT_PAGE_SIZE,
            preview_only: false,
            height: "auto".to_string(),
            width: "100%".to_string(),
        }
    }
}

impl GridOptions {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn preview(mut self) -> Self {
        self.preview_only = true;
        self
    }
}

/// A row edited since the last save, identified by its original index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedRow {
    pub id: usize,
    pub fields: RowData,
}

/// Outbound notifications for the persistence gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridEvent {
    ColumnsReordered(Vec<String>),
    SaveRequested(Vec<ChangedRow>),
}

/// A row as shown on the current page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRow<'a> {
    /// Position on the current page
    pub display_index: usize,
    pub original_index: usize,
    pub fields: &'a RowData,
    pub changed: bool,
    pub selected: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("grid is in preview mode")]
    PreviewOnly,

    #[error("the select column cannot be edited")]
    SelectColumn,

    #[error("unknown or hidden column: {0}")]
    UnknownColumn(String),

    #[error("row {0} is not on the current page")]
    RowNotOnPage(usize),

    #[error("row index {0} is out of range")]
    RowOutOfRange(usize),

    #[error("no cell is being edited")]
    NoActiveCell,

    #[error("there are no changes to save")]
    NothingToSave,
}

#[derive(Debug, Clone)]
pub struct Grid {
    options: GridOptions,
    columns: ColumnLayout,
    working: Vec<RowData>,
    changed: BTreeSet<usize>,
    selection: Selection,
    view: ViewState,
    active: Option<ActiveCell>,
    events: Vec<GridEvent>,
}

impl Grid {
    pub fn new(columns: Vec<String>, rows: Vec<RowData>, options: GridOptions) -> Self {
        let view = ViewState::new(options.page_size);
        let mut grid = Grid {
            options,
            columns: ColumnLayout::default(),
            working: Vec::new(),
            changed: BTreeSet::new(),
            selection: Selection::new(),
            view,
            active: None,
            events: Vec::new(),
        };
        grid.seed(columns, rows);
        grid
    }

    /// Replaces the dataset. The working copy is rebuilt from `rows`, the
    /// changed set and selection are cleared, and the page goes back to 0.
    /// Sort and filters on columns that still exist are kept.
    pub fn seed(&mut self, columns: Vec<String>, rows: Vec<RowData>) {
        debug!("seeding grid with {} columns, {} rows", columns.len(), rows.len());
        self.view.retain_columns(&columns);
        self.columns.reset(columns);
        self.working = rows;
        self.changed.clear();
        self.selection.clear();
        self.view.pagination.page_index = 0;
        self.active = None;
    }

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    /// Height and width hints for the host's container
    pub fn layout(&self) -> (&str, &str) {
        (&self.options.height, &self.options.width)
    }

    pub fn view_state(&self) -> &ViewState {
        &self.view
    }

    // ----- columns -----

    pub fn column_order(&self) -> &[String] {
        self.columns.order()
    }

    /// Visible data columns in display order
    pub fn visible_columns(&self) -> Vec<String> {
        self.columns.visible()
    }

    /// Header ids as rendered, the select column first unless previewing
    pub fn header_columns(&self) -> Vec<String> {
        let mut headers = Vec::new();
        if !self.options.preview_only {
            headers.push(SELECT_COLUMN.to_string());
        }
        headers.extend(self.columns.visible());
        headers
    }

    /// Changing visibility leaves the page index alone
    pub fn set_column_visible(&mut self, column: &str, visible: bool) -> bool {
        self.columns.set_visible(column, visible)
    }

    pub fn is_column_visible(&self, column: &str) -> bool {
        self.columns.is_visible(column)
    }

    pub fn begin_column_drag(&mut self, column: &str) -> bool {
        if self.options.preview_only {
            return false;
        }
        self.columns.begin_drag(column)
    }

    pub fn dragged_column(&self) -> Option<&str> {
        self.columns.dragged()
    }

    pub fn cancel_column_drag(&mut self) {
        self.columns.cancel_drag();
    }

    /// Drops the dragged header over `over`. The new order applies at once
    /// and is queued for the gateway; it is never rolled back.
    pub fn end_column_drag(&mut self, over: Option<&str>) -> Option<Vec<String>> {
        let order = self.columns.end_drag(over)?;
        self.emit_reorder(order)
    }

    /// Moves the column at `from` to position `to` in the data column order
    pub fn move_column(&mut self, from: usize, to: usize) -> Option<Vec<String>> {
        if self.options.preview_only {
            return None;
        }
        let order = self.columns.move_index(from, to)?;
        self.emit_reorder(order)
    }

    fn emit_reorder(&mut self, order: Vec<String>) -> Option<Vec<String>> {
        debug!("column order is now {:?}", order);
        self.events.push(GridEvent::ColumnsReordered(order.clone()));
        Some(order)
    }

    // ----- sorting, filtering, pagination -----

    /// Header click: none, ascending, descending, none
    pub fn toggle_sort(&mut self, column: &str) -> bool {
        if column == SELECT_COLUMN || !self.columns.contains(column) {
            return false;
        }
        self.view.toggle_sort(column);
        true
    }

    pub fn set_sort(&mut self, sort: Option<view::SortSpec>) {
        self.view.sort = sort.filter(|s| self.columns.contains(&s.column));
    }

    /// Sets or clears (with an empty value) a column filter, back to page 0
    pub fn set_column_filter(&mut self, column: &str, value: &str) -> bool {
        if column == SELECT_COLUMN || !self.columns.contains(column) {
            return false;
        }
        if value.is_empty() {
            self.view.column_filters.remove(column);
        } else {
            self.view
                .column_filters
                .insert(column.to_string(), value.to_string());
        }
        self.view.pagination.page_index = 0;
        true
    }

    pub fn column_filter(&self, column: &str) -> &str {
        self.view
            .column_filters
            .get(column)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn set_global_filter(&mut self, value: &str) {
        self.view.global_filter = value.to_string();
        self.view.pagination.page_index = 0;
    }

    pub fn global_filter(&self) -> &str {
        &self.view.global_filter
    }

    pub fn clear_filters(&mut self) {
        self.view.column_filters.clear();
        self.view.global_filter.clear();
        self.view.pagination.page_index = 0;
    }

    /// Original indices of every row that passes the filters, sorted
    pub fn display_order(&self) -> Vec<usize> {
        view::display_order(&self.working, self.columns.order(), &self.view)
    }

    pub fn filtered_count(&self) -> usize {
        view::filter_rows(&self.working, self.columns.order(), &self.view).len()
    }

    pub fn row_count(&self) -> usize {
        self.working.len()
    }

    pub fn page_index(&self) -> usize {
        self.view.pagination.page_index
    }

    pub fn page_size(&self) -> usize {
        self.view.pagination.page_size
    }

    pub fn page_count(&self) -> usize {
        view::page_count(self.filtered_count(), self.page_size())
    }

    pub fn can_next_page(&self) -> bool {
        self.page_index() + 1 < self.page_count()
    }

    pub fn can_previous_page(&self) -> bool {
        self.page_index() > 0
    }

    pub fn next_page(&mut self) -> bool {
        if !self.can_next_page() {
            return false;
        }
        self.view.pagination.page_index += 1;
        true
    }

    pub fn previous_page(&mut self) -> bool {
        if !self.can_previous_page() {
            return false;
        }
        self.view.pagination.page_index -= 1;
        true
    }

    /// Jumps to `page_index` if such a page exists
    pub fn set_page_index(&mut self, page_index: usize) -> bool {
        if page_index > 0 && page_index >= self.page_count() {
            return false;
        }
        self.view.pagination.page_index = page_index;
        true
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.view.pagination.page_size = page_size.max(1);
        self.view.pagination.page_index = 0;
    }

    /// Original indices on the current page, in display order
    pub fn page_indices(&self) -> Vec<usize> {
        let order = self.display_order();
        let (start, end) = self.view.pagination.bounds(order.len());
        order[start..end].to_vec()
    }

    pub fn page_rows(&self) -> Vec<DisplayRow<'_>> {
        self.page_indices()
            .into_iter()
            .enumerate()
            .map(|(display_index, original_index)| DisplayRow {
                display_index,
                original_index,
                fields: &self.working[original_index],
                changed: self.changed.contains(&original_index),
                selected: self.selection.is_selected(original_index),
            })
            .collect()
    }

    /// Original index of the row at `display_row` on the current page
    pub fn original_index_of(&self, display_row: usize) -> Option<usize> {
        self.page_indices().get(display_row).copied()
    }

    // ----- editing -----

    /// Working copy row by original index
    pub fn row(&self, original_index: usize) -> Option<&RowData> {
        self.working.get(original_index)
    }

    pub fn active_cell(&self) -> Option<&ActiveCell> {
        self.active.as_ref()
    }

    /// Puts a cell into edit mode
    pub fn activate_cell(&mut self, display_row: usize, column: &str) -> Result<(), GridError> {
        if self.options.preview_only {
            return Err(GridError::PreviewOnly);
        }
        if column == SELECT_COLUMN {
            return Err(GridError::SelectColumn);
        }
        if !self.columns.is_visible(column) {
            return Err(GridError::UnknownColumn(column.to_string()));
        }
        if self.original_index_of(display_row).is_none() {
            return Err(GridError::RowNotOnPage(display_row));
        }
        self.active = Some(ActiveCell::new(display_row, column));
        Ok(())
    }

    /// Current working copy value of the active cell, used to seed its input
    pub fn active_value(&self) -> Option<&str> {
        let active = self.active.as_ref()?;
        let index = self.original_index_of(active.row)?;
        Some(view::cell_value(&self.working[index], &active.column))
    }

    /// Writes `value` into the active cell
    pub fn input(&mut self, value: &str) -> Result<(), GridError> {
        let active = self.active.clone().ok_or(GridError::NoActiveCell)?;
        let index = self
            .original_index_of(active.row)
            .ok_or(GridError::RowNotOnPage(active.row))?;
        self.set_cell(index, &active.column, value)
    }

    /// Writes one working copy cell and marks the row changed
    pub fn set_cell(&mut self, original_index: usize, column: &str, value: &str) -> Result<(), GridError> {
        let Some(row) = self.working.get_mut(original_index) else {
            warn!("attempted to update row at invalid index: {}", original_index);
            return Err(GridError::RowOutOfRange(original_index));
        };
        row.insert(column.to_string(), value.to_string());
        self.changed.insert(original_index);
        Ok(())
    }

    /// Leaves edit mode; edits stay in the working copy
    pub fn blur(&mut self) {
        self.active = None;
    }

    /// Arrow-key handling while a cell is active. Returns whether the
    /// active cell moved.
    pub fn handle_key(&mut self, key: NavKey) -> bool {
        let Some(active) = self.active.clone() else {
            return false;
        };
        let columns = self.columns.visible();
        let mv = {
            let ctx = NavContext {
                columns: &columns,
                rows_on_page: self.page_indices().len(),
                page_size: self.page_size(),
                can_next_page: self.can_next_page(),
                can_previous_page: self.can_previous_page(),
            };
            navigation::navigate(&ctx, &active, key)
        };
        let Some(mv) = mv else {
            return false;
        };

        match mv.turn {
            PageTurn::Next => {
                self.next_page();
            }
            PageTurn::Previous => {
                self.previous_page();
            }
            PageTurn::Stay => {}
        }
        debug!("active cell moved to row {} column {}", mv.cell.row, mv.cell.column);
        self.active = Some(mv.cell);
        true
    }

    pub fn is_changed(&self, original_index: usize) -> bool {
        self.changed.contains(&original_index)
    }

    pub fn changed_count(&self) -> usize {
        self.changed.len()
    }

    /// Save is offered only while something is dirty
    pub fn can_save(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Rows in the changed set with their working copy contents
    pub fn changed_rows(&self) -> Vec<ChangedRow> {
        self.changed
            .iter()
            .map(|&id| ChangedRow {
                id,
                fields: self.working[id].clone(),
            })
            .collect()
    }

    /// Queues every dirty row for the gateway, then clears the changed set
    /// and the active cell without waiting for the outcome.
    pub fn save(&mut self) -> Result<usize, GridError> {
        if self.changed.is_empty() {
            return Err(GridError::NothingToSave);
        }
        let rows = self.changed_rows();
        let count = rows.len();
        debug!("saving {} changed rows", count);
        self.events.push(GridEvent::SaveRequested(rows));
        self.changed.clear();
        self.active = None;
        Ok(count)
    }

    // ----- selection -----

    pub fn is_row_selected(&self, original_index: usize) -> bool {
        self.selection.is_selected(original_index)
    }

    /// Toggles the checkbox of a row on the current page
    pub fn toggle_row_selected(&mut self, display_row: usize) -> Result<bool, GridError> {
        if self.options.preview_only {
            return Err(GridError::PreviewOnly);
        }
        let index = self
            .original_index_of(display_row)
            .ok_or(GridError::RowNotOnPage(display_row))?;
        Ok(self.selection.toggle(index))
    }

    pub fn set_row_selected(&mut self, original_index: usize, selected: bool) -> Result<(), GridError> {
        if self.options.preview_only {
            return Err(GridError::PreviewOnly);
        }
        if original_index >= self.working.len() {
            return Err(GridError::RowOutOfRange(original_index));
        }
        self.selection.set(original_index, selected);
        Ok(())
    }

    /// Whether every row passing the current filters is selected, on any page
    pub fn is_all_rows_selected(&self) -> bool {
        self.selection.all_selected(&self.display_order())
    }

    /// Header checkbox: selects every row passing the current filters, or
    /// clears them all if they already are. Returns the new state.
    pub fn toggle_all_rows_selected(&mut self) -> Result<bool, GridError> {
        if self.options.preview_only {
            return Err(GridError::PreviewOnly);
        }
        let shown = self.display_order();
        Ok(self.selection.toggle_all(&shown))
    }

    /// Selects or clears every row matching the current filters
    pub fn set_all_filtered_selected(&mut self, selected: bool) -> Result<(), GridError> {
        if self.options.preview_only {
            return Err(GridError::PreviewOnly);
        }
        for index in self.display_order() {
            self.selection.set(index, selected);
        }
        Ok(())
    }

    /// Number of selected flags, filtered out or not
    pub fn selected_count(&self) -> usize {
        self.selection.count()
    }

    /// Every selected row: those passing the filters in display order, then
    /// the filtered-out ones by original index
    pub fn get_selected_rows(&self) -> Vec<RowData> {
        let shown = self.display_order();
        let mut indices: Vec<usize> = shown
            .iter()
            .copied()
            .filter(|&i| self.selection.is_selected(i))
            .collect();
        let visible: BTreeSet<usize> = indices.iter().copied().collect();
        indices.extend(
            self.selection
                .iter()
                .filter(|i| !visible.contains(i) && *i < self.working.len()),
        );
        indices.into_iter().map(|i| self.working[i].clone()).collect()
    }

    /// Every row that passes the current filters, in display order
    pub fn get_all_filtered_rows(&self) -> Vec<RowData> {
        self.display_order()
            .into_iter()
            .map(|i| self.working[i].clone())
            .collect()
    }

    // ----- events -----

    pub fn take_events(&mut self) -> Vec<GridEvent> {
        std::mem::take(&mut self.events)
    }
}
