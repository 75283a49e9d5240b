use std::collections::BTreeSet;

/// Row selection flags keyed by original row index.
///
/// Keys are original indices, so a selection survives sorting and page
/// turns. Rows stay selected while filtered out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    selected: BTreeSet<usize>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    pub fn set(&mut self, index: usize, selected: bool) {
        if selected {
            self.selected.insert(index);
        } else {
            self.selected.remove(&index);
        }
    }

    pub fn toggle(&mut self, index: usize) -> bool {
        let selected = !self.is_selected(index);
        self.set(index, selected);
        selected
    }

    /// True when `indices` is non-empty and every entry is selected
    pub fn all_selected(&self, indices: &[usize]) -> bool {
        !indices.is_empty() && indices.iter().all(|i| self.selected.contains(i))
    }

    /// Selects every index unless all of them already are, in which case
    /// they are all cleared. Returns the resulting state.
    pub fn toggle_all(&mut self, indices: &[usize]) -> bool {
        let select = !self.all_selected(indices);
        for &index in indices {
            self.set(index, select);
        }
        select
    }

    pub fn count(&self) -> usize {
        self.selected.len()
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.selected.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_all_selects_then_clears() {
        let mut selection = Selection::new();
        selection.set(1, true);
        assert!(selection.toggle_all(&[0, 1, 2]));
        assert_eq!(selection.count(), 3);
        assert!(!selection.toggle_all(&[0, 1, 2]));
        assert_eq!(selection.count(), 0);
    }

    #[test]
    fn test_empty_page_is_never_all_selected() {
        let selection = Selection::new();
        assert!(!selection.all_selected(&[]));
    }
}
