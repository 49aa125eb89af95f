//! High-level `KvStore` wrapper over backend implementations.
//!
//! Encodes caller values with serde on the way in and decodes them into the
//! caller's declared type on the way out, so every backend shares one
//! encoding and one set of typed accessors.

use super::backend::KvBackend;
use super::durable::DurableBackend;
use super::memory::MemoryBackend;
use super::types::ZERO_TIME;
use crate::config::{BackendKind, StoreConfig};
use crate::error::{Error, Result, check_key};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// High-level key-value store interface.
///
/// Wraps a `KvBackend` implementation and provides a consistent, typed API
/// regardless of the underlying storage mechanism.
///
/// # Thread Safety
///
/// `KvStore` is `Clone` and can be shared across threads. The underlying
/// backend handles concurrent access safely.
///
/// # Example
///
/// ```ignore
/// use kvlock::kv::KvStore;
/// use std::time::Duration;
///
/// let store = KvStore::memory();
/// store.set_x("session:123", &"user_data", Duration::from_secs(3600))?;
/// let data = store.get_string("session:123")?;
/// ```
#[derive(Clone)]
pub struct KvStore {
    backend: Arc<dyn KvBackend>,
}

impl KvStore {
    /// Creates a new `KvStore` backed by an in-memory store.
    ///
    /// All data is lost when the process exits.
    pub fn memory() -> Self {
        Self::custom(MemoryBackend::new())
    }

    /// Creates a new `KvStore` backed by a redb file, storing records in
    /// `table`.
    ///
    /// # Errors
    ///
    /// Returns a storage failure if the database cannot be opened.
    pub fn durable<P: AsRef<Path>>(path: P, table: &str) -> Result<Self> {
        Ok(Self::custom(DurableBackend::open(path, table)?))
    }

    /// Creates the backend described by `config`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the config is inconsistent, or a
    /// storage failure if the durable backend cannot be opened.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        match config.store.backend {
            BackendKind::Memory => Ok(Self::memory()),
            BackendKind::Redb => Self::durable(&config.store.path, &config.store.table),
        }
    }

    /// Creates a new `KvStore` with a custom backend.
    pub fn custom<B: KvBackend>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Stores a value unconditionally.
    ///
    /// # Errors
    ///
    /// Returns a storage failure if the value cannot be encoded or written.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        check_key(key)?;
        self.backend.set(key, encode(value)?)
    }

    /// Stores a value that becomes logically absent after `ttl`.
    ///
    /// A zero `ttl` means no expiry.
    ///
    /// # Errors
    ///
    /// Returns a storage failure if the value cannot be encoded or written.
    pub fn set_x<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        check_key(key)?;
        self.backend.set_x(key, encode(value)?, ttl)
    }

    /// Stores a value only if the current value equals `expected`.
    ///
    /// Equality is value equality of the encoded forms. `None` makes this a
    /// plain [`set`](Self::set).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConditionMismatch`] if the current value differs or
    /// the key does not exist.
    pub fn set_if<T, C>(&self, key: &str, value: &T, expected: Option<&C>) -> Result<()>
    where
        T: Serialize + ?Sized,
        C: Serialize + ?Sized,
    {
        check_key(key)?;
        let expected = expected.map(encode).transpose()?;
        self.backend.set_if(key, encode(value)?, expected.as_ref())
    }

    /// Stores a value only if the key has no live record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConditionMismatch`] if the key already exists.
    pub fn set_if_not_exists<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        check_key(key)?;
        self.backend.set_if_not_exists(key, encode(value)?)
    }

    /// Removes a record. Deleting an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns a storage failure if the delete cannot be performed.
    pub fn delete(&self, key: &str) -> Result<()> {
        check_key(key)?;
        self.backend.delete(key)
    }

    /// Fetches the live value for `key` decoded as `T`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the key has no live record
    /// - [`Error::DecodeFailure`] if the stored value is not a `T`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        check_key(key)?;
        let value = self.backend.get(key)?;
        serde_json::from_value(value).map_err(|e| Error::decode(key, e))
    }

    /// Fetches the raw encoded value for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the key has no live record.
    pub fn get_raw(&self, key: &str) -> Result<Value> {
        check_key(key)?;
        self.backend.get(key)
    }

    /// Returns the value as a string, or `""` if there is no live record.
    ///
    /// # Errors
    ///
    /// Returns any error other than not-found, including decode failures.
    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get_or_zero(key, String::new())
    }

    /// Returns the value as a timestamp, or [`ZERO_TIME`] if there is no
    /// live record.
    ///
    /// # Errors
    ///
    /// Returns any error other than not-found, including decode failures.
    pub fn get_time(&self, key: &str) -> Result<DateTime<Utc>> {
        self.get_or_zero(key, ZERO_TIME)
    }

    /// Returns the value as an `i32`, or `0` if there is no live record.
    ///
    /// # Errors
    ///
    /// Returns any error other than not-found, including decode failures.
    pub fn get_i32(&self, key: &str) -> Result<i32> {
        self.get_or_zero(key, 0)
    }

    /// Returns the value as an `i64`, or `0` if there is no live record.
    ///
    /// # Errors
    ///
    /// Returns any error other than not-found, including decode failures.
    pub fn get_i64(&self, key: &str) -> Result<i64> {
        self.get_or_zero(key, 0)
    }

    fn get_or_zero<T: DeserializeOwned>(&self, key: &str, zero: T) -> Result<T> {
        match self.get(key) {
            Err(Error::NotFound { .. }) => Ok(zero),
            other => other,
        }
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::storage(format!("failed to encode value: {e}")))
}
