use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{DATE_COLUMN, UserSettings, deserialize_some};

pub const DEFAULT_DISPLAY_NAME: &str = "Default User";

pub const DEFAULT_TABLE_METRICS: &[&str] = &[
    DATE_COLUMN,
    "Weight",
    "BMI",
    "Body Fat %",
    "V-Fat",
    "S-Fat",
    "Water %",
    "BMR",
];

pub const DEFAULT_CHART_METRICS: &[&str] = &[
    "Weight",
    "BMI",
    "Body Fat %",
    "V-Fat",
    "S-Fat",
    "Water %",
    "BMR",
];

pub const DEFAULT_VISIBLE_METRICS: &[&str] = &["Weight"];

/// Partial settings update as sent by a client.
///
/// The three list fields are kept as raw JSON so a payload of the wrong shape
/// can be ignored rather than rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::option_option)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_metrics: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_metrics: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_visible_metrics: Option<Value>,
    #[serde(
        default,
        deserialize_with = "deserialize_some",
        skip_serializing_if = "Option::is_none"
    )]
    pub goal_weight: Option<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dark_mode: Option<bool>,
}

impl SettingsPatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(Some(goal)) = self.goal_weight {
            if !goal.is_finite() || goal <= 0.0 {
                bail!("goalWeight must be a positive number or null");
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn with_table_metrics(mut self, metrics: &[String]) -> Self {
        self.table_metrics = Some(Value::from(metrics.to_vec()));
        self
    }

    #[must_use]
    pub fn with_chart_metrics(mut self, metrics: &[String]) -> Self {
        self.chart_metrics = Some(Value::from(metrics.to_vec()));
        self
    }

    #[must_use]
    pub fn with_default_visible_metrics(mut self, metrics: &[String]) -> Self {
        self.default_visible_metrics = Some(Value::from(metrics.to_vec()));
        self
    }
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

#[must_use]
pub fn default_settings(user_id: &str, now: &str) -> UserSettings {
    UserSettings {
        user_id: user_id.to_string(),
        name: DEFAULT_DISPLAY_NAME.to_string(),
        table_metrics: to_owned_list(DEFAULT_TABLE_METRICS),
        chart_metrics: to_owned_list(DEFAULT_CHART_METRICS),
        default_visible_metrics: to_owned_list(DEFAULT_VISIBLE_METRICS),
        goal_weight: None,
        dark_mode: false,
        created_at: now.to_string(),
        updated_at: now.to_string(),
    }
}

/// String elements of a JSON array, or `None` when the value is not an array.
fn metric_list(value: &Value) -> Option<Vec<String>> {
    value.as_array().map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

/// Put `Date` first, exactly once, keeping the order of everything else.
#[must_use]
pub fn normalize_table_metrics(metrics: Vec<String>) -> Vec<String> {
    std::iter::once(DATE_COLUMN.to_string())
        .chain(metrics.into_iter().filter(|m| m != DATE_COLUMN))
        .collect()
}

/// Merge `patch` into `existing`, materializing the defaults first when the
/// user has no document yet.
pub fn apply_patch(
    existing: Option<UserSettings>,
    user_id: &str,
    patch: &SettingsPatch,
    now: &str,
) -> Result<UserSettings> {
    patch.validate()?;
    let mut settings = existing.unwrap_or_else(|| default_settings(user_id, now));

    if let Some(metrics) = patch.table_metrics.as_ref().and_then(metric_list) {
        settings.table_metrics = normalize_table_metrics(metrics);
    }
    if let Some(metrics) = patch.chart_metrics.as_ref().and_then(metric_list) {
        settings.chart_metrics = metrics;
    }
    if let Some(metrics) = patch.default_visible_metrics.as_ref().and_then(metric_list) {
        settings.default_visible_metrics = metrics;
    }
    if let Some(goal) = patch.goal_weight {
        settings.goal_weight = goal;
    }
    if let Some(dark) = patch.dark_mode {
        settings.dark_mode = dark;
    }
    settings.updated_at = now.to_string();
    Ok(settings)
}

/// Restore the display lists and goal weight. Dark mode is not part of the
/// reset.
#[must_use]
pub fn reset(existing: Option<UserSettings>, user_id: &str, now: &str) -> UserSettings {
    let defaults = default_settings(user_id, now);
    match existing {
        Some(mut settings) => {
            settings.table_metrics = defaults.table_metrics;
            settings.chart_metrics = defaults.chart_metrics;
            settings.default_visible_metrics = defaults.default_visible_metrics;
            settings.goal_weight = defaults.goal_weight;
            settings.updated_at = defaults.updated_at;
            settings
        }
        None => defaults,
    }
}
