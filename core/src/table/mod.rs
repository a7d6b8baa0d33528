pub mod pagination;
pub mod preferences;
pub mod selection;
pub mod sort;

use crate::models::{DATE_COLUMN, Metric, WeightEntry};

pub use pagination::{PageSize, PageWindow, Paginator, ROWS_PER_PAGE_KEY, paginate};
pub use preferences::{MemoryPreferences, PreferenceStore};
pub use selection::{ActionMenu, PointerTarget, RowSelection};
pub use sort::{SortDirection, SortState, SortValue, Sortable, sort_rows};

/// A row with a stable identifier.
pub trait Identified {
    fn record_id(&self) -> &str;
}

impl Identified for WeightEntry {
    fn record_id(&self) -> &str {
        &self.id
    }
}

impl Sortable for WeightEntry {
    fn sort_value(&self, field: &str) -> SortValue<'_> {
        if field == DATE_COLUMN {
            return SortValue::Text(&self.date);
        }
        Metric::from_label(field)
            .and_then(|m| self.metric(m))
            .map_or(SortValue::Missing, SortValue::Number)
    }
}

/// Sort weight entries by a column label, parsing dates for the `Date` column.
#[must_use]
pub fn sort_entries(entries: &[WeightEntry], state: &SortState) -> Vec<WeightEntry> {
    sort_rows(entries, state, DATE_COLUMN, crate::models::entry_timestamp)
}
