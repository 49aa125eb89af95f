//! Backend trait for the KV store.
//!
//! Defines the contract every storage backend implements. Values cross this
//! boundary already encoded as [`serde_json::Value`]; typed encoding and
//! decoding lives in [`KvStore`](super::KvStore) so it is applied the same
//! way for every backend.

use crate::error::Result;
use serde_json::Value;
use std::time::Duration;

/// Backend trait for key-value storage.
///
/// All backends must be thread-safe (`Send + Sync`). Conditional writes
/// (`set_if`, `set_if_not_exists`) must check and write atomically for a
/// single key; the expiring lock depends on nothing else.
///
/// Not-found is always reported as [`Error::NotFound`](crate::Error::NotFound),
/// whatever the backend's own convention for a missing record is.
///
/// # Example
///
/// ```ignore
/// use kvlock::kv::{KvBackend, MemoryBackend};
///
/// let backend = MemoryBackend::new();
/// backend.set("key", serde_json::json!("value"))?;
/// let value = backend.get("key")?;
/// ```
pub trait KvBackend: Send + Sync + 'static {
    /// Retrieves the live value for `key`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`](crate::Error::NotFound) if the key was never
    ///   written, was deleted, or has expired
    /// - [`Error::StorageFailure`](crate::Error::StorageFailure) if the
    ///   underlying storage operation fails
    fn get(&self, key: &str) -> Result<Value>;

    /// Stores a value unconditionally, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns a storage failure if the write cannot be performed.
    fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Stores a value that becomes logically absent once `ttl` elapses.
    ///
    /// A zero `ttl` means the record never expires.
    ///
    /// # Errors
    ///
    /// Returns a storage failure if the write cannot be performed.
    fn set_x(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Stores a value only if the current value equals `expected`.
    ///
    /// `expected == None` behaves like [`set`](Self::set).
    ///
    /// # Errors
    ///
    /// - [`Error::ConditionMismatch`](crate::Error::ConditionMismatch) if the
    ///   current value differs or the key does not exist
    /// - [`Error::StorageFailure`](crate::Error::StorageFailure) otherwise
    fn set_if(&self, key: &str, value: Value, expected: Option<&Value>) -> Result<()>;

    /// Stores a value only if the key has no record.
    ///
    /// # Errors
    ///
    /// - [`Error::ConditionMismatch`](crate::Error::ConditionMismatch) if the
    ///   key already exists
    /// - [`Error::StorageFailure`](crate::Error::StorageFailure) otherwise
    fn set_if_not_exists(&self, key: &str, value: Value) -> Result<()>;

    /// Removes a record. Deleting an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns a storage failure if the delete cannot be performed.
    fn delete(&self, key: &str) -> Result<()>;
}
