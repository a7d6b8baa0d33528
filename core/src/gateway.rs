use anyhow::{Context, Result, bail};

use crate::models::{
    ImportSummary, NewWeightEntry, UserSettings, WeightEntry, WeightEntryPatch,
    is_valid_object_id,
};
use crate::service::TrackerService;
use crate::settings::SettingsPatch;
use crate::table::RowSelection;

/// Owner of the settings document when there is no user management.
pub const DEFAULT_USER_ID: &str = "default-user";

/// Weight entries and settings as seen by a client. [`LocalGateway`] talks to
/// a [`TrackerService`] in-process; the CLI also has an HTTP implementation.
pub trait WeightGateway {
    fn list_entries(&self) -> Result<Vec<WeightEntry>>;
    fn create_entry(&self, entry: &NewWeightEntry) -> Result<WeightEntry>;
    fn update_entry(&self, id: &str, patch: &WeightEntryPatch) -> Result<WeightEntry>;
    fn delete_entry(&self, id: &str) -> Result<()>;

    /// Delete several entries in one request. `Ok(None)` means the backend has
    /// no batch operation and the caller should fall back to single deletes.
    fn delete_entries(&self, _ids: &[String]) -> Result<Option<usize>> {
        Ok(None)
    }

    fn import_csv(&self, file_name: &str, data: Vec<u8>) -> Result<ImportSummary>;
    fn export_csv(&self) -> Result<String>;
    fn template_csv(&self) -> Result<String>;

    fn get_settings(&self) -> Result<UserSettings>;
    fn update_settings(&self, patch: &SettingsPatch) -> Result<UserSettings>;
    fn reset_settings(&self) -> Result<UserSettings>;
}

/// Refuse an id before it reaches the gateway.
pub fn ensure_object_id(id: &str) -> Result<()> {
    if !is_valid_object_id(id) {
        bail!("Invalid id '{id}': expected 24 hex characters");
    }
    Ok(())
}

pub struct LocalGateway {
    service: TrackerService,
    user_id: String,
}

impl LocalGateway {
    #[must_use]
    pub fn new(service: TrackerService) -> Self {
        Self::for_user(service, DEFAULT_USER_ID)
    }

    #[must_use]
    pub fn for_user(service: TrackerService, user_id: &str) -> Self {
        Self {
            service,
            user_id: user_id.to_string(),
        }
    }
}

impl WeightGateway for LocalGateway {
    fn list_entries(&self) -> Result<Vec<WeightEntry>> {
        self.service.list_weight_entries()
    }

    fn create_entry(&self, entry: &NewWeightEntry) -> Result<WeightEntry> {
        self.service.create_weight_entry(entry.clone())
    }

    fn update_entry(&self, id: &str, patch: &WeightEntryPatch) -> Result<WeightEntry> {
        self.service
            .update_weight_entry(id, patch)?
            .with_context(|| format!("Weight entry {id} not found"))
    }

    fn delete_entry(&self, id: &str) -> Result<()> {
        if !self.service.delete_weight_entry(id)? {
            bail!("Weight entry {id} not found");
        }
        Ok(())
    }

    fn delete_entries(&self, ids: &[String]) -> Result<Option<usize>> {
        self.service.delete_weight_entries(ids).map(Some)
    }

    fn import_csv(&self, _file_name: &str, data: Vec<u8>) -> Result<ImportSummary> {
        self.service.import_csv(data.as_slice())
    }

    fn export_csv(&self) -> Result<String> {
        self.service.export_csv()
    }

    fn template_csv(&self) -> Result<String> {
        self.service.template_csv()
    }

    fn get_settings(&self) -> Result<UserSettings> {
        self.service.get_settings(&self.user_id)
    }

    fn update_settings(&self, patch: &SettingsPatch) -> Result<UserSettings> {
        self.service.update_settings(&self.user_id, patch)
    }

    fn reset_settings(&self) -> Result<UserSettings> {
        self.service.reset_settings(&self.user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkDeleteOutcome {
    pub deleted: usize,
    /// Whether the gateway's batch operation was used.
    pub batched: bool,
}

/// Delete every selected entry.
///
/// Uses the gateway's batch delete when it has one, otherwise deletes one id
/// at a time and stops at the first failure. Entries deleted before a failure
/// stay deleted. The selection is cleared only when everything succeeded.
pub fn bulk_delete<G: WeightGateway + ?Sized>(
    gateway: &G,
    selection: &mut RowSelection,
) -> Result<BulkDeleteOutcome> {
    let ids = selection.selected_ids();
    if ids.is_empty() {
        return Ok(BulkDeleteOutcome {
            deleted: 0,
            batched: false,
        });
    }

    if let Some(deleted) = gateway.delete_entries(&ids)? {
        selection.clear();
        return Ok(BulkDeleteOutcome {
            deleted,
            batched: true,
        });
    }

    tracing::warn!(
        count = ids.len(),
        "batch delete unavailable, deleting entries one at a time"
    );
    for (done, id) in ids.iter().enumerate() {
        gateway.delete_entry(id).with_context(|| {
            format!(
                "Failed to delete entry {id} ({done} of {} deleted)",
                ids.len()
            )
        })?;
    }

    selection.clear();
    Ok(BulkDeleteOutcome {
        deleted: ids.len(),
        batched: false,
    })
}
