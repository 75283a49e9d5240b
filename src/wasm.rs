//! Browser bindings for the grid engine.
//!
//! Rows and events cross the boundary as JSON strings. Reorder and save
//! events are delivered to the registered JS callbacks as soon as the call
//! that produced them returns.

use js_sys::Function;
use wasm_bindgen::prelude::*;

use crate::grid::{Grid, GridEvent, GridOptions, RowData};
use crate::navigation::NavKey;

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

#[wasm_bindgen]
pub struct GridHandle {
    grid: Grid,
    on_reorder: Option<Function>,
    on_save_requested: Option<Function>,
}

#[wasm_bindgen]
impl GridHandle {
    /// `columns_json` is an array of column ids, `rows_json` an array of
    /// string maps and `options_json` an object with any of `pageSize`,
    /// `previewOnly`, `height` and `width`.
    #[wasm_bindgen(constructor)]
    pub fn new(
        columns_json: &str,
        rows_json: &str,
        options_json: &str,
    ) -> Result<GridHandle, JsValue> {
        let columns: Vec<String> = serde_json::from_str(columns_json).map_err(js_error)?;
        let rows: Vec<RowData> = serde_json::from_str(rows_json).map_err(js_error)?;
        let options: GridOptions = if options_json.trim().is_empty() {
            GridOptions::default()
        } else {
            serde_json::from_str(options_json).map_err(js_error)?
        };
        Ok(GridHandle {
            grid: Grid::new(columns, rows, options),
            on_reorder: None,
            on_save_requested: None,
        })
    }

    /// Container height hint, `"auto"` unless configured
    pub fn height(&self) -> String {
        self.grid.layout().0.to_string()
    }

    /// Container width hint, `"100%"` unless configured
    pub fn width(&self) -> String {
        self.grid.layout().1.to_string()
    }

    pub fn preview_only(&self) -> bool {
        self.grid.options().preview_only
    }

    pub fn seed(&mut self, columns_json: &str, rows_json: &str) -> Result<(), JsValue> {
        let columns: Vec<String> = serde_json::from_str(columns_json).map_err(js_error)?;
        let rows: Vec<RowData> = serde_json::from_str(rows_json).map_err(js_error)?;
        self.grid.seed(columns, rows);
        Ok(())
    }

    /// Called with the new column order as a JSON array
    pub fn set_on_reorder(&mut self, callback: Function) {
        self.on_reorder = Some(callback);
    }

    /// Called with the changed rows as a JSON array of `{id, fields}`
    pub fn set_on_save_requested(&mut self, callback: Function) {
        self.on_save_requested = Some(callback);
    }

    fn flush_events(&mut self) -> Result<(), JsValue> {
        for event in self.grid.take_events() {
            let (callback, payload) = match &event {
                GridEvent::ColumnsReordered(order) => {
                    (&self.on_reorder, serde_json::to_string(order))
                }
                GridEvent::SaveRequested(rows) => {
                    (&self.on_save_requested, serde_json::to_string(rows))
                }
            };
            if let Some(callback) = callback {
                let payload = payload.map_err(js_error)?;
                callback.call1(&JsValue::NULL, &JsValue::from_str(&payload))?;
            }
        }
        Ok(())
    }

    pub fn header_columns(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.grid.header_columns()).map_err(js_error)
    }

    /// Current page as JSON rows with their display and original indices
    pub fn page_rows(&self) -> Result<String, JsValue> {
        let rows: Vec<serde_json::Value> = self
            .grid
            .page_rows()
            .iter()
            .map(|row| {
                serde_json::json!({
                    "displayIndex": row.display_index,
                    "originalIndex": row.original_index,
                    "fields": row.fields,
                    "changed": row.changed,
                    "selected": row.selected,
                })
            })
            .collect();
        serde_json::to_string(&rows).map_err(js_error)
    }

    pub fn toggle_sort(&mut self, column: &str) -> bool {
        self.grid.toggle_sort(column)
    }

    pub fn set_column_filter(&mut self, column: &str, value: &str) -> bool {
        self.grid.set_column_filter(column, value)
    }

    pub fn set_global_filter(&mut self, value: &str) {
        self.grid.set_global_filter(value);
    }

    pub fn set_column_visible(&mut self, column: &str, visible: bool) -> bool {
        self.grid.set_column_visible(column, visible)
    }

    pub fn page_index(&self) -> usize {
        self.grid.page_index()
    }

    pub fn page_count(&self) -> usize {
        self.grid.page_count()
    }

    pub fn next_page(&mut self) -> bool {
        self.grid.next_page()
    }

    pub fn previous_page(&mut self) -> bool {
        self.grid.previous_page()
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.grid.set_page_size(page_size);
    }

    pub fn activate_cell(&mut self, display_row: usize, column: &str) -> Result<(), JsValue> {
        self.grid.activate_cell(display_row, column).map_err(js_error)
    }

    pub fn input(&mut self, value: &str) -> Result<(), JsValue> {
        self.grid.input(value).map_err(js_error)
    }

    pub fn blur(&mut self) {
        self.grid.blur();
    }

    /// Takes a `KeyboardEvent.key` name; other keys are ignored
    pub fn key_down(&mut self, key: &str) -> bool {
        NavKey::from_key_name(key).is_some_and(|key| self.grid.handle_key(key))
    }

    pub fn begin_column_drag(&mut self, column: &str) -> bool {
        self.grid.begin_column_drag(column)
    }

    pub fn dragged_column(&self) -> Option<String> {
        self.grid.dragged_column().map(str::to_string)
    }

    /// Drop outside any header
    pub fn cancel_column_drag(&mut self) {
        self.grid.cancel_column_drag();
    }

    pub fn end_column_drag(&mut self, over: Option<String>) -> Result<bool, JsValue> {
        let moved = self.grid.end_column_drag(over.as_deref()).is_some();
        self.flush_events()?;
        Ok(moved)
    }

    pub fn toggle_row_selected(&mut self, display_row: usize) -> Result<bool, JsValue> {
        self.grid.toggle_row_selected(display_row).map_err(js_error)
    }

    /// Header checkbox over every row passing the filters
    pub fn toggle_all_rows_selected(&mut self) -> Result<bool, JsValue> {
        self.grid.toggle_all_rows_selected().map_err(js_error)
    }

    pub fn is_all_rows_selected(&self) -> bool {
        self.grid.is_all_rows_selected()
    }

    pub fn set_all_filtered_selected(&mut self, selected: bool) -> Result<(), JsValue> {
        self.grid.set_all_filtered_selected(selected).map_err(js_error)
    }

    pub fn selected_count(&self) -> usize {
        self.grid.selected_count()
    }

    pub fn can_save(&self) -> bool {
        self.grid.can_save()
    }

    /// Returns the number of rows handed to the save callback
    pub fn save(&mut self) -> Result<usize, JsValue> {
        let count = self.grid.save().map_err(js_error)?;
        self.flush_events()?;
        Ok(count)
    }

    pub fn get_selected_rows(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.grid.get_selected_rows()).map_err(js_error)
    }

    pub fn get_all_filtered_rows(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.grid.get_all_filtered_rows()).map_err(js_error)
    }
}
