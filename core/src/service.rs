use std::io::Read;
use std::path::Path;

use anyhow::{Result, bail};
use chrono::Utc;

use crate::csv_io;
use crate::db::Database;
use crate::models::{
    ImportSummary, NewWeightEntry, UserSettings, WeightEntry, WeightEntryPatch,
    is_valid_object_id,
};
use crate::settings::{self, SettingsPatch};

/// Entry point used by the CLI and the REST server.
///
/// Every settings operation takes the owning user id explicitly; weight
/// entries are not partitioned by user.
pub struct TrackerService {
    db: Database,
}

impl TrackerService {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    #[must_use]
    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    // --- Settings ---

    /// Current settings, creating and storing the defaults on first access.
    pub fn get_settings(&self, user_id: &str) -> Result<UserSettings> {
        if let Some(existing) = self.db.get_user_settings(user_id)? {
            return Ok(existing);
        }
        let defaults = settings::default_settings(user_id, &Utc::now().to_rfc3339());
        self.db.put_user_settings(&defaults)?;
        tracing::info!(user_id, "created default settings");
        Ok(defaults)
    }

    pub fn update_settings(&self, user_id: &str, patch: &SettingsPatch) -> Result<UserSettings> {
        let existing = self.db.get_user_settings(user_id)?;
        let merged = settings::apply_patch(existing, user_id, patch, &Utc::now().to_rfc3339())?;
        self.db.put_user_settings(&merged)?;
        Ok(merged)
    }

    pub fn reset_settings(&self, user_id: &str) -> Result<UserSettings> {
        let existing = self.db.get_user_settings(user_id)?;
        let reset = settings::reset(existing, user_id, &Utc::now().to_rfc3339());
        self.db.put_user_settings(&reset)?;
        Ok(reset)
    }

    // --- Weight ---

    pub fn list_weight_entries(&self) -> Result<Vec<WeightEntry>> {
        self.db.list_weight_entries()
    }

    pub fn get_weight_entry(&self, id: &str) -> Result<Option<WeightEntry>> {
        self.db.get_weight_entry(id)
    }

    pub fn create_weight_entry(&self, mut entry: NewWeightEntry) -> Result<WeightEntry> {
        entry.validate()?;
        self.db.insert_weight_entry(&entry)
    }

    /// Returns `None` if the id is well-formed but unknown.
    pub fn update_weight_entry(
        &self,
        id: &str,
        patch: &WeightEntryPatch,
    ) -> Result<Option<WeightEntry>> {
        check_id(id)?;
        patch.validate()?;
        self.db.update_weight_entry(id, patch)
    }

    pub fn delete_weight_entry(&self, id: &str) -> Result<bool> {
        check_id(id)?;
        self.db.delete_weight_entry(id)
    }

    pub fn delete_weight_entries(&self, ids: &[String]) -> Result<usize> {
        for id in ids {
            check_id(id)?;
        }
        self.db.delete_weight_entries(ids)
    }

    // --- CSV ---

    pub fn import_csv<R: Read>(&self, reader: R) -> Result<ImportSummary> {
        let summary = csv_io::import_weight_csv(&self.db, reader)?;
        tracing::info!(
            rows = summary.rows_parsed,
            imported = summary.imported,
            skipped = summary.skipped,
            "imported weight CSV"
        );
        Ok(summary)
    }

    pub fn export_csv(&self) -> Result<String> {
        csv_io::export_csv(&self.db.list_weight_entries()?)
    }

    pub fn template_csv(&self) -> Result<String> {
        csv_io::template_csv()
    }
}

fn check_id(id: &str) -> Result<()> {
    if !is_valid_object_id(id) {
        bail!("Invalid id '{id}'");
    }
    Ok(())
}
