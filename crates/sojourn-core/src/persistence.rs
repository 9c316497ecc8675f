//! History persistence
//!
//! The whole entry list is rewritten in one transaction after every
//! commit, so a crash leaves either the old list or the new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sojourn_history::EntrySnapshot;
use sojourn_storage::{Database, StorageError};

const CURRENT_INDEX_KEY: &str = "history.current_index";
const SAVED_AT_KEY: &str = "history.saved_at";

/// Serializable copy of the entry list and its cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub entries: Vec<EntrySnapshot>,
    pub current_index: Option<usize>,
    pub saved_at: DateTime<Utc>,
}

impl HistorySnapshot {
    pub fn current(&self) -> Option<&EntrySnapshot> {
        self.current_index.and_then(|i| self.entries.get(i))
    }
}

#[derive(Clone)]
pub struct HistoryRepository {
    db: Database,
}

impl HistoryRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn save(&self, snapshot: &HistorySnapshot) -> Result<(), StorageError> {
        let mut rows = Vec::with_capacity(snapshot.entries.len());
        for entry in &snapshot.entries {
            let state = entry.state.as_ref().map(serde_json::to_string).transpose()?;
            rows.push((entry, state));
        }

        self.db.transaction(|conn| {
            conn.execute("DELETE FROM history_entries", [])?;

            let mut stmt = conn.prepare(
                "INSERT INTO history_entries
                 (position, entry_key, entry_id, url, same_document, state, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (entry, state) in &rows {
                stmt.execute(rusqlite::params![
                    entry.index as i64,
                    entry.key,
                    entry.id,
                    entry.url,
                    entry.same_document,
                    state,
                    entry.created_at.to_rfc3339(),
                ])?;
            }

            match snapshot.current_index {
                Some(index) => Database::set_setting_in(conn, CURRENT_INDEX_KEY, &index.to_string())?,
                None => {
                    conn.execute("DELETE FROM settings WHERE key = ?1", [CURRENT_INDEX_KEY])?;
                }
            }
            Database::set_setting_in(conn, SAVED_AT_KEY, &snapshot.saved_at.to_rfc3339())?;
            Ok(())
        })?;

        tracing::debug!(
            entries = snapshot.entries.len(),
            current_index = ?snapshot.current_index,
            "Saved history"
        );
        Ok(())
    }

    /// The last saved list, or `None` if nothing was ever saved.
    pub fn load(&self) -> Result<Option<HistorySnapshot>, StorageError> {
        type Row = (i64, String, String, Option<String>, bool, Option<String>, String);

        let rows: Vec<Row> = self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT position, entry_key, entry_id, url, same_document, state, created_at
                 FROM history_entries ORDER BY position",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut entries = Vec::with_capacity(rows.len());
        for (position, key, id, url, same_document, state, created_at) in rows {
            let state = state.as_deref().map(serde_json::from_str).transpose()?;
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());

            entries.push(EntrySnapshot {
                key,
                id,
                url,
                index: position.max(0) as usize,
                same_document,
                state,
                created_at,
            });
        }

        let current_index = self
            .db
            .get_setting(CURRENT_INDEX_KEY)?
            .and_then(|raw| match raw.parse::<usize>() {
                Ok(index) => Some(index),
                Err(e) => {
                    tracing::warn!("Ignoring unreadable current index '{}': {}", raw, e);
                    None
                }
            });
        let saved_at = self
            .db
            .get_setting(SAVED_AT_KEY)?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(Some(HistorySnapshot {
            entries,
            current_index,
            saved_at,
        }))
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.db.transaction(|conn| {
            conn.execute("DELETE FROM history_entries", [])?;
            conn.execute(
                "DELETE FROM settings WHERE key IN (?1, ?2)",
                [CURRENT_INDEX_KEY, SAVED_AT_KEY],
            )?;
            Ok(())
        })
    }
}
