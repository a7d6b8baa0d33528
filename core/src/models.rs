use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Canonical storage format for entry dates (`MM-DD-YY`).
pub const DATE_FORMAT: &str = "%m-%d-%y";

/// Column key of the date field in tables, settings and CSV files.
pub const DATE_COLUMN: &str = "Date";

/// Length of a document-store object id in hex characters.
pub const OBJECT_ID_LEN: usize = 24;

// --- Metrics ---

/// One of the body-composition measurements a scale reports.
///
/// Serialized with its camelCase field name; [`Metric::label`] is the column
/// key used in settings lists, table headers and CSV files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Weight,
    Bmi,
    BodyFat,
    VisceralFat,
    SubcutaneousFat,
    MetabolicAge,
    HeartRate,
    Water,
    BoneMassPercent,
    Protein,
    FatFreeWeight,
    BoneMass,
    Bmr,
    MuscleMass,
}

impl Metric {
    pub const ALL: [Metric; 14] = [
        Metric::Weight,
        Metric::Bmi,
        Metric::BodyFat,
        Metric::VisceralFat,
        Metric::SubcutaneousFat,
        Metric::MetabolicAge,
        Metric::HeartRate,
        Metric::Water,
        Metric::BoneMassPercent,
        Metric::Protein,
        Metric::FatFreeWeight,
        Metric::BoneMass,
        Metric::Bmr,
        Metric::MuscleMass,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Metric::Weight => "Weight",
            Metric::Bmi => "BMI",
            Metric::BodyFat => "Body Fat %",
            Metric::VisceralFat => "V-Fat",
            Metric::SubcutaneousFat => "S-Fat",
            Metric::MetabolicAge => "Age",
            Metric::HeartRate => "HR",
            Metric::Water => "Water %",
            Metric::BoneMassPercent => "Bone Mass %",
            Metric::Protein => "Protein %",
            Metric::FatFreeWeight => "FFW",
            Metric::BoneMass => "Bone Mass",
            Metric::Bmr => "BMR",
            Metric::MuscleMass => "Muscle Mass",
        }
    }

    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Metric::Weight => "weight",
            Metric::Bmi => "bmi",
            Metric::BodyFat => "bodyFat",
            Metric::VisceralFat => "visceralFat",
            Metric::SubcutaneousFat => "subcutaneousFat",
            Metric::MetabolicAge => "metabolicAge",
            Metric::HeartRate => "heartRate",
            Metric::Water => "water",
            Metric::BoneMassPercent => "boneMassPercent",
            Metric::Protein => "protein",
            Metric::FatFreeWeight => "fatFreeWeight",
            Metric::BoneMass => "boneMass",
            Metric::Bmr => "bmr",
            Metric::MuscleMass => "muscleMass",
        }
    }

    /// Look up a metric by its column label (case-insensitive).
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.label().eq_ignore_ascii_case(label))
    }

    /// Look up a metric by its exact JSON field name.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.key() == key)
    }

    /// Look up a metric by column label or JSON field name.
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        Self::from_label(name)
            .or_else(|| {
                Self::ALL
                    .into_iter()
                    .find(|m| m.key().eq_ignore_ascii_case(name))
            })
            .with_context(|| {
                format!(
                    "Unknown metric '{name}'. Must be one of: {}",
                    Self::ALL.map(Metric::label).join(", ")
                )
            })
    }
}

// --- Weight entries ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightEntry {
    pub id: String,
    pub date: String,
    #[serde(flatten)]
    pub metrics: BTreeMap<Metric, f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl WeightEntry {
    #[must_use]
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).copied()
    }
}

/// Body of a create request. Keys that are not a metric or `date` (such as
/// `id`, `createdAt` or `notes`) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "JsonObject")]
pub struct NewWeightEntry {
    pub date: String,
    #[serde(flatten)]
    pub metrics: BTreeMap<Metric, f64>,
}

impl NewWeightEntry {
    /// Normalize the date and check every metric value.
    pub fn validate(&mut self) -> Result<()> {
        self.date = normalize_entry_date(&self.date)?;
        validate_metrics(&self.metrics)
    }
}

/// Partial update of a weight entry.
///
/// A metric mapped to `None` (JSON `null`) is cleared; metrics that are not in
/// the map are left untouched.
///
/// Unknown and read-only keys are ignored, so an entry as returned by a list
/// call can be sent back with some values changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "JsonObject")]
pub struct WeightEntryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(flatten)]
    pub metrics: BTreeMap<Metric, Option<f64>>,
}

impl WeightEntryPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.metrics.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(ref date) = self.date {
            normalize_entry_date(date)?;
        }
        for (metric, value) in &self.metrics {
            if let Some(v) = value {
                validate_metric(*metric, *v)?;
            }
        }
        Ok(())
    }

    pub fn apply_to(&self, entry: &mut WeightEntry) -> Result<()> {
        if let Some(ref date) = self.date {
            entry.date = normalize_entry_date(date)?;
        }
        for (metric, value) in &self.metrics {
            match value {
                Some(v) => {
                    validate_metric(*metric, *v)?;
                    entry.metrics.insert(*metric, *v);
                }
                None => {
                    entry.metrics.remove(metric);
                }
            }
        }
        Ok(())
    }
}

type JsonObject = serde_json::Map<String, Value>;

/// A metric value from a request body. `null` is `None`.
fn metric_value(metric: Metric, value: &Value) -> Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .with_context(|| format!("{} is out of range", metric.key())),
        _ => bail!("{} must be a number or null", metric.key()),
    }
}

fn known_metrics(object: &JsonObject) -> impl Iterator<Item = (Metric, &Value)> {
    object
        .iter()
        .filter_map(|(key, value)| Metric::from_key(key).map(|m| (m, value)))
}

impl TryFrom<JsonObject> for NewWeightEntry {
    type Error = anyhow::Error;

    fn try_from(object: JsonObject) -> Result<Self> {
        let date = match object.get("date") {
            Some(Value::String(date)) => date.clone(),
            Some(_) => bail!("date must be a string"),
            None => bail!("missing field `date`"),
        };
        let mut metrics = BTreeMap::new();
        for (metric, value) in known_metrics(&object) {
            if let Some(v) = metric_value(metric, value)? {
                metrics.insert(metric, v);
            }
        }
        Ok(Self { date, metrics })
    }
}

impl TryFrom<JsonObject> for WeightEntryPatch {
    type Error = anyhow::Error;

    fn try_from(object: JsonObject) -> Result<Self> {
        let date = match object.get("date") {
            None | Some(Value::Null) => None,
            Some(Value::String(date)) => Some(date.clone()),
            Some(_) => bail!("date must be a string or null"),
        };
        let metrics = known_metrics(&object)
            .map(|(metric, value)| Ok((metric, metric_value(metric, value)?)))
            .collect::<Result<_>>()?;
        Ok(Self { date, metrics })
    }
}

fn validate_metric(metric: Metric, value: f64) -> Result<()> {
    if !value.is_finite() {
        bail!("{} must be a finite number", metric.key());
    }
    if value < 0.0 {
        bail!("{} must not be negative", metric.key());
    }
    if metric == Metric::Weight && value == 0.0 {
        bail!("weight must be greater than 0");
    }
    Ok(())
}

pub fn validate_metrics(metrics: &BTreeMap<Metric, f64>) -> Result<()> {
    for (metric, value) in metrics {
        validate_metric(*metric, *value)?;
    }
    Ok(())
}

// --- Dates ---

const ACCEPTED_DATE_FORMATS: &[&str] = &["%m-%d-%y", "%m/%d/%y", "%m-%d-%Y", "%m/%d/%Y", "%Y-%m-%d"];

/// Parse an entry date in any accepted format.
///
/// Two-digit-year formats are skipped for inputs long enough to carry a
/// four-digit year.
#[must_use]
pub fn parse_entry_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let four_digit_year = s.len() > 8;
    ACCEPTED_DATE_FORMATS
        .iter()
        .filter(|fmt| !four_digit_year || !fmt.ends_with("%y"))
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

pub fn normalize_entry_date(s: &str) -> Result<String> {
    parse_entry_date(s)
        .map(|d| d.format(DATE_FORMAT).to_string())
        .with_context(|| format!("Invalid date '{s}'. Use MM-DD-YY"))
}

/// Milliseconds since the Unix epoch at midnight UTC of an entry date.
#[must_use]
pub fn entry_timestamp(s: &str) -> Option<i64> {
    let date = parse_entry_date(s)?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
}

// --- Object ids ---

/// Ids are stored exactly as generated, in lowercase hex.
#[must_use]
pub fn is_valid_object_id(id: &str) -> bool {
    id.len() == OBJECT_ID_LEN && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Generate a new object id: 4 bytes of big-endian Unix seconds followed by
/// 8 random bytes, hex encoded.
#[must_use]
pub fn new_object_id() -> String {
    use std::fmt::Write;

    let secs = u32::try_from(chrono::Utc::now().timestamp()).unwrap_or(u32::MAX);
    let random = uuid::Uuid::new_v4();
    secs.to_be_bytes()
        .iter()
        .chain(&random.as_bytes()[..8])
        .fold(String::with_capacity(OBJECT_ID_LEN), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

// --- Settings ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub user_id: String,
    pub name: String,
    pub table_metrics: Vec<String>,
    pub chart_metrics: Vec<String>,
    pub default_visible_metrics: Vec<String>,
    #[serde(default)]
    pub goal_weight: Option<f64>,
    #[serde(default)]
    pub dark_mode: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl UserSettings {
    /// Default-visible chart series, restricted to metrics actually charted.
    #[must_use]
    pub fn visible_chart_metrics(&self) -> Vec<&str> {
        self.default_visible_metrics
            .iter()
            .filter(|m| self.chart_metrics.contains(m))
            .map(String::as_str)
            .collect()
    }
}

// --- Import ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub rows_parsed: usize,
    pub imported: usize,
    pub skipped: usize,
}

/// Deserialize a present field as `Some`, so `Option<Option<T>>` can tell an
/// explicit `null` from a missing key.
pub fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}
