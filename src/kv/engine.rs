//! Record engine interface for the durable backend.
//!
//! The durable backend only needs a small slice of a storage engine: put a
//! record guarded by a predicate, fetch a record by key, delete a record by
//! key. [`RecordEngine`] captures exactly that slice so the backend can be
//! driven by redb, a remote table service, or a test fake.

use super::types::Record;
use serde_json::Value;

/// Predicate evaluated by the engine against the currently stored record
/// before a put is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// No record exists for the key.
    KeyNotExists,
    /// The stored record's `value` attribute equals the given value.
    ValueEquals(Value),
}

impl Condition {
    /// Evaluates the predicate against the current record, if any.
    pub fn matches(&self, current: Option<&Record>) -> bool {
        match self {
            Self::KeyNotExists => current.is_none(),
            Self::ValueEquals(expected) => {
                current.and_then(|r| r.value.as_ref()) == Some(expected)
            },
        }
    }
}

/// Errors reported by a record engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The write predicate evaluated to false.
    #[error("conditional check failed")]
    ConditionalCheckFailed,

    /// Any other engine failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Minimal storage engine used by [`DurableBackend`](super::DurableBackend).
///
/// Implementations must evaluate `condition` and apply the put atomically
/// for a single key.
pub trait RecordEngine: Send + Sync + 'static {
    /// Writes `record`, replacing any record with the same key, if
    /// `condition` holds (or is `None`).
    ///
    /// # Errors
    ///
    /// [`EngineError::ConditionalCheckFailed`] when the predicate fails,
    /// [`EngineError::Other`] for any other failure.
    fn put_item(
        &self,
        table: &str,
        record: &Record,
        condition: Option<&Condition>,
    ) -> Result<(), EngineError>;

    /// Fetches the record stored under `key`.
    ///
    /// `Ok(None)` means the engine holds no record. A returned record may
    /// already be past its `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get_item(&self, table: &str, key: &str, consistent: bool)
    -> Result<Option<Record>, EngineError>;

    /// Removes the record stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete_item(&self, table: &str, key: &str) -> Result<(), EngineError>;
}
