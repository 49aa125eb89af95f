//! In-memory KV storage backend.
//!
//! Reference implementation of the store contract: one map from key to
//! value and a second map from key to expiry instant, holding entries only
//! for keys written with a TTL. Ideal for testing and embedding.

use super::backend::KvBackend;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Maps {
    values: HashMap<String, Value>,
    expirations: HashMap<String, Instant>,
}

impl Maps {
    fn remove(&mut self, key: &str) {
        self.values.remove(key);
        self.expirations.remove(key);
    }

    fn put(&mut self, key: &str, value: Value, expires_at: Option<Instant>) {
        self.values.insert(key.to_string(), value);
        match expires_at {
            Some(at) => {
                self.expirations.insert(key.to_string(), at);
            },
            None => {
                self.expirations.remove(key);
            },
        }
    }
}

/// In-memory key-value storage backend.
///
/// Expiry is enforced lazily: an expired record is only purged when a
/// [`get`](KvBackend::get) observes it. Until then it still counts as
/// existing for [`set_if_not_exists`](KvBackend::set_if_not_exists).
///
/// # Thread Safety
///
/// Every operation runs under a single mutex covering both maps, so
/// conditional writes are atomic for concurrent callers sharing one
/// instance.
///
/// # Example
///
/// ```ignore
/// use kvlock::kv::MemoryBackend;
///
/// let backend = MemoryBackend::new();
/// backend.set("key", serde_json::json!("value"))?;
/// ```
#[derive(Default)]
pub struct MemoryBackend {
    maps: Mutex<Maps>,
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries in the store (including expired).
    pub fn len(&self) -> usize {
        self.maps.lock().values.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.maps.lock().values.is_empty()
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Value> {
        let mut maps = self.maps.lock();

        if !maps.values.contains_key(key) {
            return Err(Error::not_found(key));
        }

        if maps
            .expirations
            .get(key)
            .is_some_and(|at| *at <= Instant::now())
        {
            maps.remove(key);
            tracing::debug!(key, "purged expired entry");
            return Err(Error::not_found(key));
        }

        maps.values
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.maps.lock().put(key, value, None);
        Ok(())
    }

    fn set_x(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        // A ttl past the clock's range never expires
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(ttl)
        };
        self.maps.lock().put(key, value, expires_at);
        Ok(())
    }

    fn set_if(&self, key: &str, value: Value, expected: Option<&Value>) -> Result<()> {
        let Some(expected) = expected else {
            return self.set(key, value);
        };

        let mut maps = self.maps.lock();
        if maps.values.get(key) != Some(expected) {
            return Err(Error::mismatch(key));
        }
        maps.put(key, value, None);
        Ok(())
    }

    fn set_if_not_exists(&self, key: &str, value: Value) -> Result<()> {
        let mut maps = self.maps.lock();
        if maps.values.contains_key(key) {
            return Err(Error::mismatch(key));
        }
        maps.put(key, value, None);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.maps.lock().remove(key);
        Ok(())
    }
}
