use std::collections::BTreeMap;
use std::io::{Read, Write};

use anyhow::{Context, Result, bail};

use crate::db::Database;
use crate::models::{
    DATE_COLUMN, ImportSummary, Metric, NewWeightEntry, WeightEntry, normalize_entry_date,
    validate_metrics,
};

/// Column headers in file order: `Date` followed by every metric label.
#[must_use]
pub fn csv_headers() -> Vec<&'static str> {
    std::iter::once(DATE_COLUMN)
        .chain(Metric::ALL.into_iter().map(Metric::label))
        .collect()
}

/// Rows read from a CSV upload, ready to insert.
#[derive(Debug, Clone, Default)]
pub struct ParsedCsv {
    pub entries: Vec<NewWeightEntry>,
    pub rows_parsed: usize,
    pub skipped: usize,
}

/// Parse a weight CSV from any reader.
///
/// Only `Date` is required; metric columns are matched by label,
/// case-insensitively, and unknown columns are ignored. Blank lines are
/// dropped; rows with a bad date or a bad number are counted as skipped.
pub fn parse_weight_csv<R: Read>(reader: R) -> Result<ParsedCsv> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();
    let Some(idx_date) = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(DATE_COLUMN))
    else {
        bail!("Missing required column: {DATE_COLUMN}");
    };
    let columns: Vec<(usize, Metric)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| Metric::from_label(h).map(|m| (i, m)))
        .collect();

    let mut parsed = ParsedCsv::default();

    for (line_num, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to parse CSV row {}", line_num + 2))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        parsed.rows_parsed += 1;

        match parse_row(&record, idx_date, &columns) {
            Some(entry) => parsed.entries.push(entry),
            None => parsed.skipped += 1,
        }
    }

    Ok(parsed)
}

fn parse_row(
    record: &csv::StringRecord,
    idx_date: usize,
    columns: &[(usize, Metric)],
) -> Option<NewWeightEntry> {
    let date = normalize_entry_date(record.get(idx_date)?).ok()?;
    let mut metrics = BTreeMap::new();
    for (idx, metric) in columns {
        let cell = record.get(*idx).unwrap_or("");
        if cell.is_empty() {
            continue;
        }
        metrics.insert(*metric, cell.parse::<f64>().ok()?);
    }
    validate_metrics(&metrics).ok()?;
    Some(NewWeightEntry { date, metrics })
}

/// Parse a CSV and store every valid row in one transaction.
pub fn import_weight_csv<R: Read>(db: &Database, reader: R) -> Result<ImportSummary> {
    let parsed = parse_weight_csv(reader)?;
    let stored = db.insert_weight_entries(&parsed.entries)?;
    Ok(ImportSummary {
        rows_parsed: parsed.rows_parsed,
        imported: stored.len(),
        skipped: parsed.skipped,
    })
}

/// Write entries with the full header. Missing metrics become empty cells.
pub fn write_weight_csv<W: Write>(entries: &[WeightEntry], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(csv_headers())?;
    for entry in entries {
        let mut row = Vec::with_capacity(Metric::ALL.len() + 1);
        row.push(entry.date.clone());
        for metric in Metric::ALL {
            row.push(entry.metric(metric).map(|v| v.to_string()).unwrap_or_default());
        }
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_csv(entries: &[WeightEntry]) -> Result<String> {
    let mut buf = Vec::new();
    write_weight_csv(entries, &mut buf)?;
    String::from_utf8(buf).context("CSV output was not valid UTF-8")
}

/// A header-only file for users to fill in.
pub fn template_csv() -> Result<String> {
    export_csv(&[])
}
