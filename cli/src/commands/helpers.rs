use anyhow::{Context, Result, bail};
use chrono::Local;
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::Path;

use bodytrack_core::models::{DATE_COLUMN, DATE_FORMAT, Metric, normalize_entry_date};

/// Resolve a date argument to the stored `MM-DD-YY` form.
pub(crate) fn parse_date(date_str: Option<String>) -> Result<String> {
    let today = Local::now().date_naive();
    let date = match date_str.as_deref().map(str::trim) {
        None | Some("today") => today,
        Some("yesterday") => today - chrono::Duration::days(1),
        Some("tomorrow") => today + chrono::Duration::days(1),
        Some(s) => {
            return normalize_entry_date(s).with_context(|| {
                format!("Invalid date '{s}'. Use MM-DD-YY, YYYY-MM-DD or today/yesterday/tomorrow")
            });
        }
    };
    Ok(date.format(DATE_FORMAT).to_string())
}

/// Parse `NAME=VALUE`, where `NAME` is a column label or JSON field name.
pub(crate) fn parse_metric_assignment(s: &str) -> Result<(Metric, f64)> {
    let (name, value) = s
        .split_once('=')
        .with_context(|| format!("Invalid metric '{s}'. Use NAME=VALUE, e.g. BMI=24.1"))?;
    let metric = Metric::parse(name)?;
    let value: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: '{}'", metric.label(), value.trim()))?;
    Ok((metric, value))
}

/// Parse a comma-separated list of metric names into column labels.
///
/// Duplicates are dropped. `Date` is accepted only when `allow_date` is set.
pub(crate) fn parse_metric_list(s: &str, allow_date: bool) -> Result<Vec<String>> {
    let mut labels: Vec<String> = Vec::new();
    for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let label = if name.eq_ignore_ascii_case(DATE_COLUMN) {
            if !allow_date {
                bail!("'{DATE_COLUMN}' cannot be used here");
            }
            DATE_COLUMN.to_string()
        } else {
            Metric::parse(name)?.label().to_string()
        };
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    Ok(labels)
}

/// Ask a yes/no question on stderr. Anything but `y`/`yes` is a no.
pub(crate) fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N] ");
    io::stderr().flush()?;
    let stdin = io::stdin();
    let Some(line) = stdin.lock().lines().next() else {
        return Ok(false);
    };
    Ok(matches!(
        line?.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

/// Write `contents` to `output`, or stdout when no path is given.
pub(crate) fn write_output(output: Option<&Path>, contents: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, contents)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => print!("{contents}"),
    }
    Ok(())
}

pub(crate) fn format_metric(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v}"))
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}
