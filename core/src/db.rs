use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{NewWeightEntry, UserSettings, WeightEntry, WeightEntryPatch, new_object_id};

/// Document store: each weight entry and settings document is kept as a JSON
/// blob keyed by its id, with the timestamps mirrored into columns.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS weight_entries (
                    id TEXT PRIMARY KEY,
                    doc TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS user_settings (
                    user_id TEXT PRIMARY KEY,
                    doc TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Weight Entries ---

    /// Store a new entry. The caller is expected to have validated it.
    pub fn insert_weight_entry(&self, entry: &NewWeightEntry) -> Result<WeightEntry> {
        let now = Utc::now().to_rfc3339();
        let stored = WeightEntry {
            id: new_object_id(),
            date: entry.date.clone(),
            metrics: entry.metrics.clone(),
            created_at: now.clone(),
            updated_at: now,
        };
        self.conn.execute(
            "INSERT INTO weight_entries (id, doc, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                stored.id,
                serde_json::to_string(&stored)?,
                stored.created_at,
                stored.updated_at
            ],
        )?;
        Ok(stored)
    }

    pub fn get_weight_entry(&self, id: &str) -> Result<Option<WeightEntry>> {
        let doc: Option<String> = self
            .conn
            .query_row(
                "SELECT doc FROM weight_entries WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        doc.map(|d| decode_entry(&d)).transpose()
    }

    /// All entries in insertion order.
    pub fn list_weight_entries(&self) -> Result<Vec<WeightEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT doc FROM weight_entries ORDER BY rowid")?;
        let docs = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        docs.iter().map(|d| decode_entry(d)).collect()
    }

    /// Apply a partial update. Returns `None` if no entry has this id.
    pub fn update_weight_entry(
        &self,
        id: &str,
        patch: &WeightEntryPatch,
    ) -> Result<Option<WeightEntry>> {
        let Some(mut entry) = self.get_weight_entry(id)? else {
            return Ok(None);
        };
        patch.apply_to(&mut entry)?;
        entry.updated_at = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE weight_entries SET doc = ?1, updated_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(&entry)?, entry.updated_at, id],
        )?;
        Ok(Some(entry))
    }

    pub fn delete_weight_entry(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM weight_entries WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Delete several entries in one transaction. Unknown ids are ignored;
    /// returns how many rows were removed.
    pub fn delete_weight_entries(&self, ids: &[String]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM weight_entries WHERE id = ?1")?;
            for id in ids {
                deleted += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    /// Insert many validated entries at once, all or nothing.
    pub fn insert_weight_entries(&self, entries: &[NewWeightEntry]) -> Result<Vec<WeightEntry>> {
        let tx = self.conn.unchecked_transaction()?;
        let mut stored = Vec::with_capacity(entries.len());
        for entry in entries {
            stored.push(self.insert_weight_entry(entry)?);
        }
        tx.commit()?;
        Ok(stored)
    }

    // --- User Settings ---

    pub fn get_user_settings(&self, user_id: &str) -> Result<Option<UserSettings>> {
        let doc: Option<String> = self
            .conn
            .query_row(
                "SELECT doc FROM user_settings WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        doc.map(|d| {
            serde_json::from_str(&d)
                .with_context(|| format!("Corrupt settings document for user {user_id}"))
        })
        .transpose()
    }

    /// Replace the whole settings document for `settings.user_id`.
    pub fn put_user_settings(&self, settings: &UserSettings) -> Result<()> {
        self.conn.execute(
            "INSERT INTO user_settings (user_id, doc, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                doc = excluded.doc,
                updated_at = excluded.updated_at",
            params![
                settings.user_id,
                serde_json::to_string(settings)?,
                settings.created_at,
                settings.updated_at
            ],
        )?;
        Ok(())
    }
}

fn decode_entry(doc: &str) -> Result<WeightEntry> {
    serde_json::from_str(doc).context("Corrupt weight entry document")
}
