use std::collections::BTreeMap;

use super::Identified;
use crate::models::is_valid_object_id;

/// Selected-row state for one table, keyed by record id.
///
/// Only ids in object-id format can be selected; placeholder rows are skipped
/// by every toggle and excluded from every count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSelection {
    selected: BTreeMap<String, bool>,
}

fn valid_ids<R: Identified>(rows: &[R]) -> impl Iterator<Item = &str> {
    rows.iter()
        .map(Identified::record_id)
        .filter(|id| is_valid_object_id(id))
}

impl RowSelection {
    #[must_use]
    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.get(id).copied().unwrap_or(false)
    }

    /// Flip one row. Returns `false` (and changes nothing) for an invalid id.
    pub fn toggle_row(&mut self, id: &str) -> bool {
        if !is_valid_object_id(id) {
            return false;
        }
        let entry = self.selected.entry(id.to_string()).or_insert(false);
        *entry = !*entry;
        true
    }

    /// Select every valid row on the page, or deselect them all if they are
    /// already all selected.
    pub fn toggle_page<R: Identified>(&mut self, page_rows: &[R]) {
        let select = !self.is_current_page_all_selected(page_rows);
        for id in valid_ids(page_rows) {
            self.selected.insert(id.to_string(), select);
        }
    }

    /// Same as [`toggle_page`](Self::toggle_page) over the whole dataset.
    pub fn toggle_all<R: Identified>(&mut self, all_rows: &[R]) {
        let select = !self.is_all_selected(all_rows);
        for id in valid_ids(all_rows) {
            self.selected.insert(id.to_string(), select);
        }
    }

    #[must_use]
    pub fn selected_count(&self) -> usize {
        self.selected.values().filter(|v| **v).count()
    }

    #[must_use]
    pub fn current_page_selected_count<R: Identified>(&self, page_rows: &[R]) -> usize {
        valid_ids(page_rows)
            .filter(|id| self.is_selected(id))
            .count()
    }

    #[must_use]
    pub fn is_current_page_all_selected<R: Identified>(&self, page_rows: &[R]) -> bool {
        let total = valid_ids(page_rows).count();
        total > 0 && self.current_page_selected_count(page_rows) == total
    }

    /// The derived "select all" flag: every valid id in the dataset is selected.
    #[must_use]
    pub fn is_all_selected<R: Identified>(&self, all_rows: &[R]) -> bool {
        let total = valid_ids(all_rows).count();
        total > 0 && valid_ids(all_rows).filter(|id| self.is_selected(id)).count() == total
    }

    /// Selected ids in sorted order.
    #[must_use]
    pub fn selected_ids(&self) -> Vec<String> {
        self.selected
            .iter()
            .filter(|(_, v)| **v)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Forget ids that are no longer in the dataset.
    pub fn prune<R: Identified>(&mut self, all_rows: &[R]) {
        let present: std::collections::HashSet<&str> = valid_ids(all_rows).collect();
        self.selected.retain(|id, _| present.contains(id.as_str()));
    }
}

/// Where a pointer interaction landed relative to an action menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerTarget {
    Trigger,
    Menu,
    Outside,
}

/// Open/closed state of the bulk-action menu.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionMenu {
    open: bool,
}

impl ActionMenu {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn toggle(&mut self) {
        self.open = !self.open;
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    /// Close on any interaction outside both the trigger and the menu.
    /// Clicks on the trigger are handled by [`toggle`](Self::toggle).
    pub fn handle_pointer(&mut self, target: PointerTarget) {
        if target == PointerTarget::Outside {
            self.close();
        }
    }
}
