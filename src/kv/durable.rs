//! Durable KV storage backend.
//!
//! Maps the store contract onto a [`RecordEngine`]: every write becomes a
//! `{key, value, updated_at, ttl?}` record, conditional writes become
//! predicates evaluated by the engine, and engine quirks (stale records
//! past their `ttl`, records without a `value`) are normalized into
//! [`Error::NotFound`] here so callers never see them.

use super::backend::KvBackend;
use super::engine::{Condition, EngineError, RecordEngine};
use super::redb::{DEFAULT_TABLE, RedbEngine};
use super::types::Record;
use crate::error::{Error, Result};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

/// Durable key-value storage backend.
///
/// Atomicity of conditional writes is delegated entirely to the engine's
/// conditional put.
///
/// # Example
///
/// ```ignore
/// use kvlock::kv::DurableBackend;
///
/// let backend = DurableBackend::open("data/kv.redb", "kv")?;
/// backend.set_if_not_exists("key", serde_json::json!("value"))?;
/// ```
pub struct DurableBackend<E: RecordEngine = RedbEngine> {
    engine: E,
    table: String,
}

impl DurableBackend<RedbEngine> {
    /// Opens a redb-backed durable backend storing records in `table`.
    ///
    /// # Errors
    ///
    /// Returns a storage failure if the database cannot be opened or the
    /// table cannot be created.
    pub fn open<P: AsRef<Path>>(path: P, table: &str) -> Result<Self> {
        let path = path.as_ref();
        let engine = RedbEngine::open(path)
            .and_then(|engine| {
                if table != DEFAULT_TABLE {
                    engine.ensure_table(table)?;
                }
                Ok(engine)
            })
            .map_err(|e| {
                tracing::warn!(path = %path.display(), error = %format!("{e:#}"), "failed to open KV database");
                Error::storage("failed to open database")
            })?;
        Ok(Self::new(engine, table))
    }
}

impl<E: RecordEngine> DurableBackend<E> {
    /// Creates a backend over an existing engine and table.
    pub fn new(engine: E, table: impl Into<String>) -> Self {
        Self {
            engine,
            table: table.into(),
        }
    }

    /// Returns the underlying engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Returns the table records are stored in.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn put(
        &self,
        key: &str,
        value: Value,
        condition: Option<Condition>,
        ttl: Duration,
    ) -> Result<()> {
        let record = Record::new(key, value, ttl);

        match self
            .engine
            .put_item(&self.table, &record, condition.as_ref())
        {
            Ok(()) => Ok(()),
            Err(EngineError::ConditionalCheckFailed) => Err(Error::mismatch(key)),
            Err(EngineError::Other(e)) => {
                tracing::warn!(key, table = %self.table, error = %format!("{e:#}"), "failed to store item");
                Err(Error::storage("failed to store item"))
            },
        }
    }
}

impl<E: RecordEngine> KvBackend for DurableBackend<E> {
    fn get(&self, key: &str) -> Result<Value> {
        let record = self
            .engine
            .get_item(&self.table, key, true)
            .map_err(|e| {
                tracing::warn!(key, table = %self.table, error = %e, "failed to fetch item");
                Error::storage("failed to fetch item")
            })?;

        let Some(record) = record else {
            return Err(Error::not_found(key));
        };

        // The engine may keep returning records after their ttl until its
        // own cleanup runs.
        if record.is_expired() {
            return Err(Error::not_found(key));
        }

        record.value.ok_or_else(|| Error::not_found(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.put(key, value, None, Duration::ZERO)
    }

    fn set_x(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        self.put(key, value, None, ttl)
    }

    fn set_if(&self, key: &str, value: Value, expected: Option<&Value>) -> Result<()> {
        let condition = expected.map(|v| Condition::ValueEquals(v.clone()));
        self.put(key, value, condition, Duration::ZERO)
    }

    fn set_if_not_exists(&self, key: &str, value: Value) -> Result<()> {
        self.put(key, value, Some(Condition::KeyNotExists), Duration::ZERO)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.engine.delete_item(&self.table, key).map_err(|e| {
            tracing::warn!(key, table = %self.table, error = %e, "failed to delete item");
            Error::storage("failed to delete entry")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;

    /// Engine fake that returns whatever records it was seeded with, stale
    /// or malformed, and can be told to fail.
    #[derive(Default)]
    struct FakeEngine {
        records: Mutex<HashMap<String, Record>>,
        fail: bool,
    }

    impl RecordEngine for FakeEngine {
        fn put_item(
            &self,
            _table: &str,
            record: &Record,
            condition: Option<&Condition>,
        ) -> std::result::Result<(), EngineError> {
            if self.fail {
                return Err(anyhow::anyhow!("connection reset").into());
            }
            let mut records = self.records.lock();
            if let Some(condition) = condition
                && !condition.matches(records.get(&record.key))
            {
                return Err(EngineError::ConditionalCheckFailed);
            }
            records.insert(record.key.clone(), record.clone());
            Ok(())
        }

        fn get_item(
            &self,
            _table: &str,
            key: &str,
            _consistent: bool,
        ) -> std::result::Result<Option<Record>, EngineError> {
            if self.fail {
                return Err(anyhow::anyhow!("connection reset").into());
            }
            Ok(self.records.lock().get(key).cloned())
        }

        fn delete_item(&self, _table: &str, key: &str) -> std::result::Result<(), EngineError> {
            if self.fail {
                return Err(anyhow::anyhow!("connection reset").into());
            }
            self.records.lock().remove(key);
            Ok(())
        }
    }

    #[test]
    fn test_stale_record_reads_as_not_found() {
        let backend = DurableBackend::new(FakeEngine::default(), "t");
        let mut record = Record::new("k", json!("v"), Duration::ZERO);
        record.ttl = Some(Utc::now().timestamp() - 5);
        backend.engine().records.lock().insert("k".into(), record);

        assert!(backend.get("k").unwrap_err().is_not_found());
    }

    #[test]
    fn test_record_without_value_reads_as_not_found() {
        let backend = DurableBackend::new(FakeEngine::default(), "t");
        let mut record = Record::new("k", json!("v"), Duration::ZERO);
        record.value = None;
        backend.engine().records.lock().insert("k".into(), record);

        assert!(backend.get("k").unwrap_err().is_not_found());
    }

    #[test]
    fn test_zero_ttl_in_record_never_expires() {
        let backend = DurableBackend::new(FakeEngine::default(), "t");
        let mut record = Record::new("k", json!("v"), Duration::ZERO);
        record.ttl = Some(0);
        backend.engine().records.lock().insert("k".into(), record);

        assert_eq!(backend.get("k").unwrap(), json!("v"));
    }

    #[test]
    fn test_engine_failures_become_storage_failures() {
        let backend = DurableBackend::new(
            FakeEngine {
                fail: true,
                ..FakeEngine::default()
            },
            "t",
        );

        for err in [
            backend.get("k").unwrap_err(),
            backend.set("k", json!(1)).unwrap_err(),
            backend.set_if_not_exists("k", json!(1)).unwrap_err(),
            backend.delete("k").unwrap_err(),
        ] {
            match err {
                Error::StorageFailure(message) => assert!(!message.contains("connection")),
                other => panic!("expected storage failure, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_set_if_sends_value_predicate() {
        let backend = DurableBackend::new(FakeEngine::default(), "t");
        backend.set("k", json!("a")).unwrap();

        assert!(
            backend
                .set_if("k", json!("b"), Some(&json!("wrong")))
                .unwrap_err()
                .is_mismatch()
        );
        backend.set_if("k", json!("b"), Some(&json!("a"))).unwrap();
        assert_eq!(backend.get("k").unwrap(), json!("b"));
    }

    #[test]
    fn test_set_x_writes_ttl_attribute() {
        let backend = DurableBackend::new(FakeEngine::default(), "t");
        backend
            .set_x("k", json!("v"), Duration::from_secs(60))
            .unwrap();
        backend.set("plain", json!("v")).unwrap();

        let records = backend.engine().records.lock();
        assert!(records["k"].ttl.is_some());
        assert!(records["plain"].ttl.is_none());
    }

    #[test]
    fn test_open_redb_with_custom_table() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = DurableBackend::open(tmp.path().join("kv.redb"), "configs").unwrap();

        backend.set("k", json!(42)).unwrap();
        assert_eq!(backend.get("k").unwrap(), json!(42));
        assert_eq!(backend.table(), "configs");
    }
}
