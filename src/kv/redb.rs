//! Redb-backed record engine.
//!
//! Provides persistent record storage using redb with ACID guarantees.
//! Records are stored as JSON under their key, one redb table per table
//! name. redb runs write transactions one at a time, so evaluating a
//! [`Condition`] and inserting inside the same write transaction is atomic.

use super::engine::{Condition, EngineError, RecordEngine};
use super::types::Record;
use anyhow::{Context, Result};
use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableError};
use std::path::Path;
use std::sync::Arc;

/// Default table name for KV records.
pub const DEFAULT_TABLE: &str = "kv";

fn table_def(name: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(name)
}

/// Redb-backed record engine.
///
/// # Thread Safety
///
/// `RedbEngine` is `Clone` and can be shared across threads. The underlying
/// database handles concurrent access safely.
#[derive(Clone)]
pub struct RedbEngine {
    db: Arc<Database>,
}

impl RedbEngine {
    /// Opens or creates a redb database at the given path.
    ///
    /// Creates parent directories if needed and initializes the default
    /// table so reads against it never observe a missing table.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Parent directory cannot be created
    /// - Database file cannot be opened or created (permissions, disk full, etc.)
    /// - Initialization transaction fails to begin or commit
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create KV directory: {}", parent.display()))?;
        }

        let db = Database::create(path)
            .with_context(|| format!("Failed to open KV database: {}", path.display()))?;

        let engine = Self { db: Arc::new(db) };
        engine.ensure_table(DEFAULT_TABLE)?;
        Ok(engine)
    }

    /// Creates `table` if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the initialization transaction fails.
    pub fn ensure_table(&self, table: &str) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin initialization transaction")?;
        {
            let _table = write_txn
                .open_table(table_def(table))
                .with_context(|| format!("Failed to initialize table '{table}'"))?;
        }
        write_txn
            .commit()
            .context("Failed to commit initialization transaction")?;
        Ok(())
    }

    /// Removes every record in `table` whose `ttl` has passed.
    ///
    /// This is the engine's own passive cleanup. Readers never depend on it
    /// having run; it only reclaims space.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be scanned or the removal
    /// transaction fails.
    pub fn purge_expired(&self, table: &str) -> Result<usize> {
        let now = Utc::now();
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin purge transaction")?;

        let purged = {
            let mut tbl = write_txn
                .open_table(table_def(table))
                .with_context(|| format!("Failed to open table '{table}'"))?;

            let mut expired_keys = Vec::new();
            for item in tbl.iter().context("Failed to iterate KV table")? {
                let (key, value) = item.context("Failed to read KV entry")?;
                // Records that fail to decode are left for a human to inspect
                if let Ok(record) = serde_json::from_slice::<Record>(value.value())
                    && record.is_expired_at(now)
                {
                    expired_keys.push(key.value().to_string());
                }
            }

            for key in &expired_keys {
                tbl.remove(key.as_str())
                    .with_context(|| format!("Failed to remove key '{key}'"))?;
            }
            expired_keys.len()
        };

        write_txn
            .commit()
            .context("Failed to commit purge transaction")?;

        if purged > 0 {
            tracing::debug!(table, purged, "purged expired records");
        }
        Ok(purged)
    }
}

impl RecordEngine for RedbEngine {
    fn put_item(
        &self,
        table: &str,
        record: &Record,
        condition: Option<&Condition>,
    ) -> Result<(), EngineError> {
        let json = serde_json::to_vec(record).context("Failed to serialize record to JSON")?;

        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;

        {
            let mut tbl = write_txn
                .open_table(table_def(table))
                .with_context(|| format!("Failed to open table '{table}'"))?;

            if let Some(condition) = condition {
                let current = tbl
                    .get(record.key.as_str())
                    .with_context(|| format!("Failed to read key '{}'", record.key))?
                    .map(|guard| serde_json::from_slice::<Record>(guard.value()))
                    .transpose()
                    .with_context(|| format!("Failed to deserialize record '{}'", record.key))?;

                if !condition.matches(current.as_ref()) {
                    // Dropping the transaction aborts it
                    return Err(EngineError::ConditionalCheckFailed);
                }
            }

            tbl.insert(record.key.as_str(), json.as_slice())
                .with_context(|| format!("Failed to insert key '{}'", record.key))?;
        }

        write_txn
            .commit()
            .context("Failed to commit put transaction")?;
        Ok(())
    }

    // redb reads always observe the latest committed transaction, so every
    // read is consistent regardless of the flag.
    fn get_item(
        &self,
        table: &str,
        key: &str,
        _consistent: bool,
    ) -> Result<Option<Record>, EngineError> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;

        let tbl = match read_txn.open_table(table_def(table)) {
            Ok(tbl) => tbl,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to open table '{table}'"))
                    .into());
            },
        };

        let record = tbl
            .get(key)
            .with_context(|| format!("Failed to read key '{key}'"))?
            .map(|guard| serde_json::from_slice::<Record>(guard.value()))
            .transpose()
            .with_context(|| format!("Failed to deserialize record '{key}'"))?;

        Ok(record)
    }

    fn delete_item(&self, table: &str, key: &str) -> Result<(), EngineError> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;

        {
            let mut tbl = write_txn
                .open_table(table_def(table))
                .with_context(|| format!("Failed to open table '{table}'"))?;
            tbl.remove(key)
                .with_context(|| format!("Failed to remove key '{key}'"))?;
        }

        write_txn
            .commit()
            .context("Failed to commit delete transaction")?;
        Ok(())
    }
}
