use anyhow::{Context, Result, bail};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::Path;
use std::process;
use tabled::{
    builder::Builder,
    settings::{Alignment, Modify, Style, object::Columns},
};

use bodytrack_core::gateway::{WeightGateway, bulk_delete, ensure_object_id};
use bodytrack_core::models::{
    DATE_COLUMN, Metric, NewWeightEntry, UserSettings, WeightEntry, WeightEntryPatch,
};
use bodytrack_core::table::{
    PageSize, Paginator, RowSelection, SortDirection, SortState, sort_entries,
};

use super::helpers::{
    confirm, format_metric, json_error, parse_date, parse_metric_assignment, write_output,
};
use crate::config::{Config, FilePreferences};
use crate::server::MAX_UPLOAD_BYTES;

pub(crate) struct ListOptions {
    pub sort: Option<String>,
    pub desc: bool,
    pub page: usize,
    pub rows: Option<String>,
    pub chart: bool,
    pub json: bool,
}

pub(crate) enum DeleteTarget {
    Ids(Vec<String>),
    Page {
        page: usize,
        sort: Option<String>,
        desc: bool,
    },
    All,
}

pub(crate) fn cmd_weight_add(
    gateway: &dyn WeightGateway,
    weight: f64,
    date: Option<String>,
    metrics: &[String],
    json: bool,
) -> Result<()> {
    let mut values = BTreeMap::from([(Metric::Weight, weight)]);
    for assignment in metrics {
        let (metric, value) = parse_metric_assignment(assignment)?;
        values.insert(metric, value);
    }
    let entry = NewWeightEntry {
        date: parse_date(date)?,
        metrics: values,
    };

    let created = gateway.create_entry(&entry)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&created)?);
    } else {
        println!(
            "Added {} for {} (id {})",
            format_metric(created.metric(Metric::Weight)),
            created.date,
            created.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_weight_list(
    gateway: &dyn WeightGateway,
    config: &Config,
    opts: &ListOptions,
) -> Result<()> {
    let entries = gateway.list_entries()?;
    let settings = gateway.get_settings()?;

    if opts.chart {
        return print_chart(&entries, &settings, opts.json);
    }

    let mut prefs = FilePreferences::open(&config.preferences_path);
    let mut pager = Paginator::load(&prefs);
    if let Some(ref rows) = opts.rows {
        pager.set_rows_per_page(PageSize::parse(rows)?, &mut prefs)?;
    }
    pager.go_to_page(opts.page);

    let sorted = sort_entries(&entries, &sort_state(opts.sort.as_deref(), opts.desc)?);
    let window = pager.window(Some(sorted.as_slice()));
    if window.total_pages > 0 && window.current_page != opts.page {
        eprintln!(
            "Page {} is out of range ({} page(s)), showing page 1",
            opts.page, window.total_pages
        );
    }

    if opts.json {
        let body = json!({
            "entries": window.rows,
            "page": window.current_page,
            "totalPages": window.total_pages,
            "totalRecords": window.total_records,
            "rowsPerPage": pager.rows_per_page().as_i64(),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    if entries.is_empty() {
        eprintln!(
            "No weight entries found. Use `bodytrack weight add` or `bodytrack weight import` to add some."
        );
        return Ok(());
    }

    println!("{}", entry_table(window.rows, &settings.table_metrics));
    println!(
        "Rows {}-{} of {} | page {} of {} | {} per page",
        window.index_of_first_row + 1,
        window.index_of_last_row,
        window.total_records,
        window.current_page,
        window.total_pages,
        page_size_label(pager.rows_per_page()),
    );
    if let Some(goal) = settings.goal_weight {
        println!("Goal weight: {goal}");
    }
    Ok(())
}

pub(crate) fn cmd_weight_update(
    gateway: &dyn WeightGateway,
    id: &str,
    date: Option<String>,
    weight: Option<f64>,
    metrics: &[String],
    clear: &[String],
    json: bool,
) -> Result<()> {
    ensure_object_id(id)?;

    let mut patch = WeightEntryPatch {
        date: date.map(|d| parse_date(Some(d))).transpose()?,
        metrics: BTreeMap::new(),
    };
    if let Some(w) = weight {
        patch.metrics.insert(Metric::Weight, Some(w));
    }
    for assignment in metrics {
        let (metric, value) = parse_metric_assignment(assignment)?;
        patch.metrics.insert(metric, Some(value));
    }
    for name in clear {
        let metric = Metric::parse(name)?;
        if metric == Metric::Weight {
            bail!("Weight cannot be cleared");
        }
        patch.metrics.insert(metric, None);
    }
    if patch.is_empty() {
        bail!("Nothing to update. Provide at least one of --date, --weight, --metric or --clear");
    }

    let updated = gateway.update_entry(id, &patch)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&updated)?);
    } else {
        println!("Updated entry {} ({})", updated.id, updated.date);
    }
    Ok(())
}

pub(crate) fn cmd_weight_delete(
    gateway: &dyn WeightGateway,
    config: &Config,
    target: DeleteTarget,
    yes: bool,
    json: bool,
) -> Result<()> {
    let entries = gateway.list_entries()?;
    let mut selection = RowSelection::default();

    match target {
        DeleteTarget::All => selection.toggle_all(&entries),
        DeleteTarget::Page { page, sort, desc } => {
            let prefs = FilePreferences::open(&config.preferences_path);
            let mut pager = Paginator::load(&prefs);
            pager.go_to_page(page);
            let sorted = sort_entries(&entries, &sort_state(sort.as_deref(), desc)?);
            let window = pager.window(Some(sorted.as_slice()));
            if window.current_page != page {
                bail!("Page {page} does not exist ({} page(s))", window.total_pages);
            }
            selection.toggle_page(window.rows);
        }
        DeleteTarget::Ids(ids) => {
            if ids.is_empty() {
                bail!("Nothing to delete. Pass entry IDs, --page or --all");
            }
            for id in &ids {
                ensure_object_id(id)?;
                if !entries.iter().any(|e| &e.id == id) {
                    if json {
                        println!("{}", json_error(&format!("Weight entry {id} not found")));
                    } else {
                        eprintln!("Weight entry {id} not found");
                    }
                    process::exit(2);
                }
                if !selection.is_selected(id) {
                    selection.toggle_row(id);
                }
            }
        }
    }

    let count = selection.selected_count();
    if count == 0 {
        if json {
            println!("{}", json!({ "deleted": 0 }));
        } else {
            eprintln!("No entries to delete");
        }
        return Ok(());
    }

    let noun = if count == 1 { "entry" } else { "entries" };
    if !yes && !confirm(&format!("Delete {count} {noun}?"))? {
        eprintln!("Cancelled");
        return Ok(());
    }

    let outcome = bulk_delete(gateway, &mut selection)?;

    if json {
        println!(
            "{}",
            json!({ "deleted": outcome.deleted, "batched": outcome.batched })
        );
    } else {
        println!("Deleted {} {noun}", outcome.deleted);
    }
    Ok(())
}

pub(crate) fn cmd_weight_import(gateway: &dyn WeightGateway, file: &Path, json: bool) -> Result<()> {
    let is_csv = file
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if !is_csv {
        bail!("Only .csv files can be imported");
    }

    let data = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    if data.len() > MAX_UPLOAD_BYTES {
        bail!(
            "{} is larger than the {} MB upload limit",
            file.display(),
            MAX_UPLOAD_BYTES / (1024 * 1024)
        );
    }
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.csv");

    let summary = gateway.import_csv(file_name, data)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Imported {} of {} rows from {}",
            summary.imported,
            summary.rows_parsed,
            file.display()
        );
        if summary.skipped > 0 {
            eprintln!(
                "Skipped {} row(s) with a missing or invalid date",
                summary.skipped
            );
        }
    }
    Ok(())
}

pub(crate) fn cmd_weight_export(gateway: &dyn WeightGateway, output: Option<&Path>) -> Result<()> {
    write_output(output, &gateway.export_csv()?)
}

pub(crate) fn cmd_weight_template(
    gateway: &dyn WeightGateway,
    output: Option<&Path>,
) -> Result<()> {
    write_output(output, &gateway.template_csv()?)
}

/// Resolve a `--sort` column name to a table column label.
fn sort_state(sort: Option<&str>, desc: bool) -> Result<SortState> {
    let direction = if desc {
        SortDirection::Descending
    } else {
        SortDirection::Ascending
    };
    match sort {
        None => Ok(SortState::default()),
        Some(name) if name.trim().eq_ignore_ascii_case(DATE_COLUMN) => {
            Ok(SortState::by(DATE_COLUMN, direction))
        }
        Some(name) => Ok(SortState::by(Metric::parse(name)?.label(), direction)),
    }
}

fn page_size_label(size: PageSize) -> String {
    match size {
        PageSize::All => "all".to_string(),
        size => size.as_i64().to_string(),
    }
}

fn cell(entry: &WeightEntry, column: &str) -> String {
    if column == DATE_COLUMN {
        return entry.date.clone();
    }
    format_metric(Metric::from_label(column).and_then(|m| entry.metric(m)))
}

/// Render entries with an ID column followed by `columns`.
fn entry_table(rows: &[WeightEntry], columns: &[String]) -> String {
    let mut builder = Builder::default();
    builder.push_record(std::iter::once("ID".to_string()).chain(columns.iter().cloned()));
    for entry in rows {
        builder.push_record(
            std::iter::once(entry.id.clone()).chain(columns.iter().map(|c| cell(entry, c))),
        );
    }
    let first_numeric = 1 + usize::from(columns.first().is_some_and(|c| c == DATE_COLUMN));
    builder
        .build()
        .with(Style::rounded())
        .with(Modify::new(Columns::new(first_numeric..)).with(Alignment::right()))
        .to_string()
}

/// Date-ordered points for the default-visible chart series.
fn chart_points(entries: &[WeightEntry], series: &[&str]) -> Vec<Map<String, Value>> {
    let by_date = sort_entries(entries, &SortState::by(DATE_COLUMN, SortDirection::Ascending));
    by_date
        .iter()
        .map(|entry| {
            let mut point = Map::new();
            point.insert(DATE_COLUMN.to_string(), Value::from(entry.date.clone()));
            for label in series {
                let value = Metric::from_label(label).and_then(|m| entry.metric(m));
                point.insert((*label).to_string(), value.map_or(Value::Null, Value::from));
            }
            point
        })
        .collect()
}

fn print_chart(entries: &[WeightEntry], settings: &UserSettings, json: bool) -> Result<()> {
    let series = settings.visible_chart_metrics();
    let points = chart_points(entries, &series);

    if json {
        let body = json!({ "series": series, "points": points });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }
    if series.is_empty() {
        eprintln!("No chart series are visible. Use `bodytrack settings set --visible` to pick some.");
        return Ok(());
    }

    let mut builder = Builder::default();
    builder.push_record(
        std::iter::once(DATE_COLUMN.to_string()).chain(series.iter().map(|s| (*s).to_string())),
    );
    for point in &points {
        builder.push_record(
            std::iter::once(DATE_COLUMN)
                .chain(series.iter().copied())
                .map(|key| match point.get(key) {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    _ => "-".to_string(),
                }),
        );
    }
    let table = builder
        .build()
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bodytrack_core::gateway::LocalGateway;
    use bodytrack_core::service::TrackerService;

    fn entry(id: &str, date: &str, weight: f64) -> WeightEntry {
        WeightEntry {
            id: id.to_string(),
            date: date.to_string(),
            metrics: BTreeMap::from([(Metric::Weight, weight)]),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn gateway_with(dates: &[&str]) -> LocalGateway {
        let gateway = LocalGateway::new(TrackerService::new_in_memory().unwrap());
        for date in dates {
            cmd_weight_add(&gateway, 180.0, Some((*date).to_string()), &[], true).unwrap();
        }
        gateway
    }

    #[test]
    fn test_sort_state_resolves_labels() {
        assert_eq!(sort_state(None, true).unwrap(), SortState::default());
        assert_eq!(
            sort_state(Some("date"), true).unwrap(),
            SortState::by("Date", SortDirection::Descending)
        );
        assert_eq!(
            sort_state(Some("bodyFat"), false).unwrap(),
            SortState::by("Body Fat %", SortDirection::Ascending)
        );
        assert!(sort_state(Some("shoe"), false).is_err());
    }

    #[test]
    fn test_entry_table_uses_configured_columns() {
        let rows = vec![entry("a", "03-01-24", 180.5)];
        let table = entry_table(&rows, &["Date".to_string(), "Weight".to_string(), "BMI".to_string()]);
        assert!(table.contains("Weight"));
        assert!(table.contains("180.5"));
        assert!(table.contains("03-01-24"));
        assert!(!table.contains("HR"));
    }

    #[test]
    fn test_chart_points_are_date_ordered() {
        let entries = vec![
            entry("a", "01-05-25", 178.0),
            entry("b", "12-20-24", 181.0),
        ];
        let points = chart_points(&entries, &["Weight", "BMI"]);
        assert_eq!(points[0]["Date"], "12-20-24");
        assert_eq!(points[1]["Weight"], 178.0);
        assert_eq!(points[0]["BMI"], Value::Null);
    }

    #[test]
    fn test_page_size_label() {
        assert_eq!(page_size_label(PageSize::All), "all");
        assert_eq!(page_size_label(PageSize::Fifty), "50");
    }

    #[test]
    fn test_add_with_extra_metrics() {
        let gateway = LocalGateway::new(TrackerService::new_in_memory().unwrap());
        cmd_weight_add(
            &gateway,
            180.0,
            Some("2024-03-01".to_string()),
            &["BMI=24.1".to_string(), "HR=61".to_string()],
            true,
        )
        .unwrap();
        let entries = gateway.list_entries().unwrap();
        assert_eq!(entries[0].date, "03-01-24");
        assert_eq!(entries[0].metric(Metric::Bmi), Some(24.1));
        assert_eq!(entries[0].metric(Metric::HeartRate), Some(61.0));
    }

    #[test]
    fn test_update_sets_and_clears_metrics() {
        let gateway = LocalGateway::new(TrackerService::new_in_memory().unwrap());
        cmd_weight_add(&gateway, 180.0, None, &["BMI=24.1".to_string()], true).unwrap();
        let id = gateway.list_entries().unwrap()[0].id.clone();

        cmd_weight_update(
            &gateway,
            &id,
            None,
            Some(179.0),
            &["HR=60".to_string()],
            &["BMI".to_string()],
            true,
        )
        .unwrap();

        let updated = &gateway.list_entries().unwrap()[0];
        assert_eq!(updated.metric(Metric::Weight), Some(179.0));
        assert_eq!(updated.metric(Metric::HeartRate), Some(60.0));
        assert_eq!(updated.metric(Metric::Bmi), None);
    }

    #[test]
    fn test_update_requires_a_change_and_valid_id() {
        let gateway = LocalGateway::new(TrackerService::new_in_memory().unwrap());
        assert!(cmd_weight_update(&gateway, "default-1", None, Some(1.0), &[], &[], true).is_err());
        let id = format!("{:024x}", 1);
        assert!(cmd_weight_update(&gateway, &id, None, None, &[], &[], true).is_err());
        assert!(
            cmd_weight_update(&gateway, &id, None, None, &[], &["Weight".to_string()], true)
                .is_err()
        );
    }

    #[test]
    fn test_delete_all_and_page() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path().to_path_buf()).unwrap();
        let dates: Vec<String> = (1..=12).map(|d| format!("03-{d:02}-24")).collect();
        let refs: Vec<&str> = dates.iter().map(String::as_str).collect();
        let gateway = gateway_with(&refs);

        let target = DeleteTarget::Page {
            page: 2,
            sort: Some("Date".to_string()),
            desc: false,
        };
        cmd_weight_delete(&gateway, &config, target, true, true).unwrap();
        let remaining = gateway.list_entries().unwrap();
        assert_eq!(remaining.len(), 10);
        assert!(remaining.iter().all(|e| e.date.as_str() <= "03-10-24"));

        assert!(
            cmd_weight_delete(
                &gateway,
                &config,
                DeleteTarget::Page {
                    page: 3,
                    sort: None,
                    desc: false
                },
                true,
                true
            )
            .is_err()
        );

        cmd_weight_delete(&gateway, &config, DeleteTarget::All, true, true).unwrap();
        assert!(gateway.list_entries().unwrap().is_empty());
    }

    #[test]
    fn test_delete_by_ids() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path().to_path_buf()).unwrap();
        let gateway = gateway_with(&["03-01-24", "03-02-24"]);
        let id = gateway.list_entries().unwrap()[0].id.clone();

        cmd_weight_delete(
            &gateway,
            &config,
            DeleteTarget::Ids(vec![id.clone(), id]),
            true,
            true,
        )
        .unwrap();
        assert_eq!(gateway.list_entries().unwrap().len(), 1);

        assert!(
            cmd_weight_delete(&gateway, &config, DeleteTarget::Ids(vec![]), true, true).is_err()
        );
        assert!(
            cmd_weight_delete(
                &gateway,
                &config,
                DeleteTarget::Ids(vec!["bad".to_string()]),
                true,
                true
            )
            .is_err()
        );
    }

    #[test]
    fn test_list_persists_rows_per_page() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path().to_path_buf()).unwrap();
        let gateway = gateway_with(&["03-01-24"]);
        let opts = ListOptions {
            sort: None,
            desc: false,
            page: 1,
            rows: Some("25".to_string()),
            chart: false,
            json: true,
        };
        cmd_weight_list(&gateway, &config, &opts).unwrap();

        let prefs = FilePreferences::open(&config.preferences_path);
        assert_eq!(Paginator::load(&prefs).rows_per_page(), PageSize::TwentyFive);
    }

    #[test]
    fn test_import_checks_extension_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = LocalGateway::new(TrackerService::new_in_memory().unwrap());

        let txt = dir.path().join("weights.txt");
        std::fs::write(&txt, "Date,Weight\n03-01-24,180\n").unwrap();
        assert!(cmd_weight_import(&gateway, &txt, true).is_err());

        let csv = dir.path().join("weights.CSV");
        std::fs::write(&csv, "Date,Weight\n03-01-24,180\nnope,1\n").unwrap();
        cmd_weight_import(&gateway, &csv, true).unwrap();
        assert_eq!(gateway.list_entries().unwrap().len(), 1);
    }
}
