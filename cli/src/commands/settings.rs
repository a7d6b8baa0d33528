use anyhow::{Result, bail};

use bodytrack_core::gateway::WeightGateway;
use bodytrack_core::models::UserSettings;
use bodytrack_core::settings::SettingsPatch;

use super::helpers::{confirm, parse_metric_list};

pub(crate) struct SettingsUpdate {
    pub table: Option<String>,
    pub chart: Option<String>,
    pub visible: Option<String>,
    pub goal_weight: Option<f64>,
    pub clear_goal: bool,
    pub dark_mode: Option<bool>,
}

impl SettingsUpdate {
    fn to_patch(&self) -> Result<SettingsPatch> {
        let mut patch = SettingsPatch {
            goal_weight: if self.clear_goal {
                Some(None)
            } else {
                self.goal_weight.map(Some)
            },
            dark_mode: self.dark_mode,
            ..SettingsPatch::default()
        };
        if let Some(ref table) = self.table {
            let columns = parse_metric_list(table, true)?;
            if columns.is_empty() {
                bail!("--table needs at least one column");
            }
            patch = patch.with_table_metrics(&columns);
        }
        if let Some(ref chart) = self.chart {
            patch = patch.with_chart_metrics(&parse_metric_list(chart, false)?);
        }
        if let Some(ref visible) = self.visible {
            patch = patch.with_default_visible_metrics(&parse_metric_list(visible, false)?);
        }
        if patch == SettingsPatch::default() {
            bail!(
                "Nothing to change. Provide at least one of --table, --chart, --visible, --goal-weight, --clear-goal or --dark-mode"
            );
        }
        patch.validate()?;
        Ok(patch)
    }
}

pub(crate) fn cmd_settings_show(gateway: &dyn WeightGateway, json: bool) -> Result<()> {
    print_settings(&gateway.get_settings()?, json)
}

pub(crate) fn cmd_settings_set(
    gateway: &dyn WeightGateway,
    update: &SettingsUpdate,
    json: bool,
) -> Result<()> {
    let patch = update.to_patch()?;
    let settings = gateway.update_settings(&patch)?;
    print_settings(&settings, json)
}

pub(crate) fn cmd_settings_reset(gateway: &dyn WeightGateway, yes: bool, json: bool) -> Result<()> {
    if !yes && !confirm("Reset columns, chart series and goal weight to defaults?")? {
        eprintln!("Cancelled");
        return Ok(());
    }
    let settings = gateway.reset_settings()?;
    print_settings(&settings, json)
}

fn print_settings(settings: &UserSettings, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(settings)?);
        return Ok(());
    }

    let goal = settings
        .goal_weight
        .map_or_else(|| "not set".to_string(), |g| g.to_string());
    println!("Name:             {}", settings.name);
    println!("Table columns:    {}", settings.table_metrics.join(", "));
    println!("Chart series:     {}", settings.chart_metrics.join(", "));
    println!("Shown by default: {}", settings.visible_chart_metrics().join(", "));
    println!("Goal weight:      {goal}");
    println!(
        "Dark mode:        {}",
        if settings.dark_mode { "on" } else { "off" }
    );
    Ok(())
}
