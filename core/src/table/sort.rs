use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            other => anyhow::bail!("Invalid sort direction '{other}'. Use asc or desc"),
        }
    }
}

/// Active sort column. `field == None` leaves rows in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortState {
    pub field: Option<String>,
    pub direction: SortDirection,
}

impl SortState {
    #[must_use]
    pub fn by(field: &str, direction: SortDirection) -> Self {
        Self {
            field: Some(field.to_string()),
            direction,
        }
    }

    /// A header click: the same column flips direction, a new column starts
    /// ascending.
    pub fn click(&mut self, field: &str) {
        if self.field.as_deref() == Some(field) {
            self.direction = self.direction.toggled();
        } else {
            self.field = Some(field.to_string());
            self.direction = SortDirection::Ascending;
        }
    }
}

/// A cell value as seen by the comparator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortValue<'a> {
    Number(f64),
    Text(&'a str),
    Missing,
}

pub trait Sortable {
    fn sort_value(&self, field: &str) -> SortValue<'_>;
}

fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn compare_values<F>(a: SortValue<'_>, b: SortValue<'_>, is_date: bool, parse_date: &F) -> Ordering
where
    F: Fn(&str) -> Option<i64>,
{
    match (a, b) {
        (SortValue::Text(x), SortValue::Text(y)) if is_date => {
            match (parse_date(x), parse_date(y)) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => Ordering::Equal,
            }
        }
        (SortValue::Number(x), SortValue::Number(y)) => {
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (SortValue::Text(x), SortValue::Text(y)) => compare_text(x, y),
        _ => Ordering::Equal,
    }
}

/// Return a sorted copy of `rows`. The input is untouched and equal keys keep
/// their relative order in both directions.
pub fn sort_rows<R, F>(rows: &[R], state: &SortState, date_field: &str, parse_date: F) -> Vec<R>
where
    R: Sortable + Clone,
    F: Fn(&str) -> Option<i64>,
{
    let mut sorted = rows.to_vec();
    let Some(field) = state.field.as_deref() else {
        return sorted;
    };
    let is_date = field == date_field;
    sorted.sort_by(|a, b| {
        let ord = compare_values(a.sort_value(field), b.sort_value(field), is_date, &parse_date);
        match state.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });
    sorted
}
