use anyhow::{Result, bail};

use super::preferences::PreferenceStore;

/// Preference key under which the chosen page size is remembered.
pub const ROWS_PER_PAGE_KEY: &str = "rowsPerPage";

/// Rows shown per page. `All` is stored as the sentinel `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSize {
    #[default]
    Ten,
    TwentyFive,
    Fifty,
    Hundred,
    All,
}

impl PageSize {
    pub const CHOICES: [PageSize; 5] = [
        PageSize::Ten,
        PageSize::TwentyFive,
        PageSize::Fifty,
        PageSize::Hundred,
        PageSize::All,
    ];

    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            PageSize::Ten => 10,
            PageSize::TwentyFive => 25,
            PageSize::Fifty => 50,
            PageSize::Hundred => 100,
            PageSize::All => -1,
        }
    }

    #[must_use]
    pub fn from_i64(value: i64) -> Option<Self> {
        Self::CHOICES.into_iter().find(|s| s.as_i64() == value)
    }

    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(PageSize::All);
        }
        match s.parse::<i64>().ok().and_then(Self::from_i64) {
            Some(size) => Ok(size),
            None => bail!("Invalid page size '{s}'. Must be one of: 10, 25, 50, 100, all"),
        }
    }

    /// Rows per page for a dataset of `total` records.
    #[allow(clippy::cast_sign_loss)]
    fn effective(self, total: usize) -> usize {
        match self {
            PageSize::All => total,
            size => size.as_i64() as usize,
        }
    }
}

/// The visible slice of a record list.
#[derive(Debug, Clone, PartialEq)]
pub struct PageWindow<'a, T> {
    pub total_records: usize,
    pub total_pages: usize,
    /// 1-indexed; already reset to 1 if the requested page was out of range.
    pub current_page: usize,
    pub index_of_first_row: usize,
    pub index_of_last_row: usize,
    pub rows: &'a [T],
}

/// Compute the window for `current_page` (1-indexed). A missing record list
/// is treated as empty and an out-of-range page silently becomes page 1.
#[must_use]
pub fn paginate<T>(records: Option<&[T]>, size: PageSize, current_page: usize) -> PageWindow<'_, T> {
    let records = records.unwrap_or_default();
    let total_records = records.len();
    let per_page = size.effective(total_records);
    let total_pages = if per_page == 0 {
        0
    } else {
        total_records.div_ceil(per_page)
    };
    let current_page = if current_page == 0 || current_page > total_pages {
        1
    } else {
        current_page
    };
    let index_of_first_row = ((current_page - 1) * per_page).min(total_records);
    let index_of_last_row = (current_page * per_page).min(total_records);

    PageWindow {
        total_records,
        total_pages,
        current_page,
        index_of_first_row,
        index_of_last_row,
        rows: &records[index_of_first_row..index_of_last_row],
    }
}

/// Page controls for one table, restored from and persisted to a
/// [`PreferenceStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    rows_per_page: PageSize,
    current_page: usize,
}

impl Default for Paginator {
    fn default() -> Self {
        Self {
            rows_per_page: PageSize::default(),
            current_page: 1,
        }
    }
}

impl Paginator {
    /// Restore the remembered page size; anything unrecognized falls back to 10.
    pub fn load<P: PreferenceStore + ?Sized>(prefs: &P) -> Self {
        let rows_per_page = prefs
            .get(ROWS_PER_PAGE_KEY)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(PageSize::from_i64)
            .unwrap_or_default();
        Self {
            rows_per_page,
            current_page: 1,
        }
    }

    #[must_use]
    pub fn rows_per_page(&self) -> PageSize {
        self.rows_per_page
    }

    #[must_use]
    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// Change the page size, jump back to page 1 and remember the choice.
    pub fn set_rows_per_page<P: PreferenceStore + ?Sized>(
        &mut self,
        size: PageSize,
        prefs: &mut P,
    ) -> Result<()> {
        self.rows_per_page = size;
        self.current_page = 1;
        prefs.set(ROWS_PER_PAGE_KEY, &size.as_i64().to_string())
    }

    pub fn go_to_page(&mut self, page: usize) {
        self.current_page = page.max(1);
    }

    pub fn next_page(&mut self, total_pages: usize) {
        if self.current_page < total_pages {
            self.current_page += 1;
        }
    }

    pub fn previous_page(&mut self) {
        if self.current_page > 1 {
            self.current_page -= 1;
        }
    }

    /// Window over `records`, writing back any out-of-range reset.
    pub fn window<'a, T>(&mut self, records: Option<&'a [T]>) -> PageWindow<'a, T> {
        let window = paginate(records, self.rows_per_page, self.current_page);
        self.current_page = window.current_page;
        window
    }
}
