//! Column order, visibility and header drag state.

use std::collections::BTreeSet;

/// Id of the pseudo-column holding row checkboxes. It is never part of
/// the data column order and cannot be hidden, sorted, filtered or dragged.
pub const SELECT_COLUMN: &str = "select";

/// Moves the element at `from` to position `to`, shifting the others
///
/// # Examples
/// ```
/// use batchsheet::columns::array_move;
///
/// let moved = array_move(&["a", "b", "c", "d"], 0, 2);
/// assert_eq!(moved, vec!["b", "c", "a", "d"]);
/// ```
pub fn array_move<T: Clone>(items: &[T], from: usize, to: usize) -> Vec<T> {
    let mut moved = items.to_vec();
    if from >= moved.len() || to >= moved.len() {
        return moved;
    }
    let item = moved.remove(from);
    moved.insert(to, item);
    moved
}

#[derive(Debug, Clone, Default)]
pub struct ColumnLayout {
    order: Vec<String>,
    hidden: BTreeSet<String>,
    dragged: Option<String>,
}

impl ColumnLayout {
    pub fn new(columns: Vec<String>) -> Self {
        ColumnLayout {
            order: columns,
            hidden: BTreeSet::new(),
            dragged: None,
        }
    }

    /// Replaces the order with a freshly supplied column list. Hidden flags
    /// survive for columns that still exist.
    pub fn reset(&mut self, columns: Vec<String>) {
        self.hidden.retain(|c| columns.contains(c));
        self.order = columns;
        self.dragged = None;
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, column: &str) -> bool {
        self.order.iter().any(|c| c == column)
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.order.iter().position(|c| c == column)
    }

    /// Data columns in order, without hidden ones
    pub fn visible(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|c| !self.hidden.contains(*c))
            .cloned()
            .collect()
    }

    pub fn is_visible(&self, column: &str) -> bool {
        self.contains(column) && !self.hidden.contains(column)
    }

    /// Returns false for unknown columns and for the select column
    pub fn set_visible(&mut self, column: &str, visible: bool) -> bool {
        if column == SELECT_COLUMN || !self.contains(column) {
            return false;
        }
        if visible {
            self.hidden.remove(column);
        } else {
            self.hidden.insert(column.to_string());
        }
        true
    }

    pub fn begin_drag(&mut self, column: &str) -> bool {
        if column == SELECT_COLUMN || !self.contains(column) {
            return false;
        }
        self.dragged = Some(column.to_string());
        true
    }

    pub fn dragged(&self) -> Option<&str> {
        self.dragged.as_deref()
    }

    pub fn cancel_drag(&mut self) {
        self.dragged = None;
    }

    /// Ends the current drag over `over`. Returns the new order when the
    /// drop actually moved something.
    pub fn end_drag(&mut self, over: Option<&str>) -> Option<Vec<String>> {
        let active = self.dragged.take()?;
        let over = over?;
        if active == over {
            return None;
        }
        self.move_column(&active, over)
    }

    /// Moves `column` to the slot currently held by `target`
    pub fn move_column(&mut self, column: &str, target: &str) -> Option<Vec<String>> {
        let from = self.position(column)?;
        let to = self.position(target)?;
        self.move_index(from, to)
    }

    pub fn move_index(&mut self, from: usize, to: usize) -> Option<Vec<String>> {
        if from == to || from >= self.order.len() || to >= self.order.len() {
            return None;
        }
        self.order = array_move(&self.order, from, to);
        Some(self.order.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ColumnLayout {
        ColumnLayout::new(
            ["a", "b", "c", "d", "e"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        )
    }

    #[test]
    fn test_move_keeps_relative_order_of_others() {
        for from in 0..5 {
            for to in 0..5 {
                let moved = array_move(&["a", "b", "c", "d", "e"], from, to);
                let original = ["a", "b", "c", "d", "e"];
                assert_eq!(moved[to], original[from]);
                let rest: Vec<_> = moved.iter().filter(|c| **c != original[from]).collect();
                let expected: Vec<_> = original.iter().filter(|c| **c != original[from]).collect();
                assert_eq!(rest, expected);
            }
        }
    }

    #[test]
    fn test_drag_drop_moves_column() {
        let mut layout = layout();
        assert!(layout.begin_drag("e"));
        let order = layout.end_drag(Some("b")).unwrap();
        assert_eq!(order, vec!["a", "e", "b", "c", "d"]);
        assert_eq!(layout.dragged(), None);
    }

    #[test]
    fn test_drop_on_self_or_nothing_is_noop() {
        let mut layout = layout();
        layout.begin_drag("c");
        assert!(layout.end_drag(Some("c")).is_none());
        layout.begin_drag("c");
        assert!(layout.end_drag(None).is_none());
        assert!(layout.end_drag(Some("a")).is_none());
        assert_eq!(layout.order()[2], "c");
    }

    #[test]
    fn test_select_column_is_fixed() {
        let mut layout = layout();
        assert!(!layout.begin_drag(SELECT_COLUMN));
        assert!(!layout.set_visible(SELECT_COLUMN, false));
    }

    #[test]
    fn test_hidden_flags_survive_reset() {
        let mut layout = layout();
        layout.set_visible("b", false);
        layout.set_visible("c", false);
        layout.reset(vec!["b".to_string(), "z".to_string()]);
        assert_eq!(layout.visible(), vec!["z"]);
        assert!(!layout.is_visible("c"));
    }
}
