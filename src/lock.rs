//! Expiring locks built on the store's conditional writes.
//!
//! A lock is nothing more than a key whose value is the timestamp of the
//! last acquisition, or [`CLEARED_LOCK`] once released. Acquiring reads that
//! timestamp and, if it is older than the lock's TTL, swaps in the current
//! time with a compare-and-set against the value just read. Whoever wins the
//! conditional write holds the lock; everyone else sees a mismatch.
//!
//! Locks are advisory: a holder that outlives its TTL can be overtaken, and
//! nothing fences writes made by a holder that lost the lock.
//!
//! # Example
//!
//! ```ignore
//! use kvlock::{KvStore, acquire_expiring_lock};
//! use std::time::Duration;
//!
//! let store = KvStore::memory();
//! let lock = acquire_expiring_lock(&store, "locks/reindex", Duration::from_secs(30))?;
//! // ... critical section ...
//! lock.release()?;
//! ```

use crate::error::{Error, Result, check_key};
use crate::kv::{KvStore, ZERO_TIME};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Value stored under a lock key when nobody holds the lock.
///
/// Distinct from [`ZERO_TIME`], which means the key was never written.
pub const CLEARED_LOCK: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// A held expiring lock.
///
/// Dropping it without calling [`release`](Self::release) leaves the lock
/// held until its TTL lapses.
#[derive(Clone)]
#[must_use = "the lock stays held until released or expired"]
pub struct ExpiringLock {
    store: KvStore,
    key: String,
    acquired_at: DateTime<Utc>,
}

impl std::fmt::Debug for ExpiringLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringLock")
            .field("key", &self.key)
            .field("acquired_at", &self.acquired_at)
            .finish_non_exhaustive()
    }
}

impl ExpiringLock {
    /// The lock key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The timestamp this holder wrote when acquiring.
    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Releases the lock if this holder still owns it.
    ///
    /// If another process already took over after this holder's TTL lapsed,
    /// the release is a no-op and returns `Ok(())`; the new holder's lock is
    /// left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageFailure`] if the store fails.
    pub fn release(self) -> Result<()> {
        match self
            .store
            .set_if(&self.key, &CLEARED_LOCK, Some(&self.acquired_at))
        {
            Ok(()) => {
                tracing::debug!(lock = %self.key, "released lock");
                Ok(())
            },
            Err(Error::ConditionMismatch { .. }) => {
                tracing::debug!(lock = %self.key, "lock already taken over, release skipped");
                Ok(())
            },
            Err(e) => {
                tracing::warn!(lock = %self.key, error = %e, "failed to clear lock");
                Err(Error::storage("failed to clear lock"))
            },
        }
    }
}

/// Acquires the lock stored under `lock`, expiring after `expiry`.
///
/// # Errors
///
/// - [`Error::LockUnavailable`] if the lock is held and unexpired, or
///   another process won the race to acquire it
/// - [`Error::StorageFailure`] if the store fails
/// - [`Error::InvalidKey`] if `lock` is empty
pub fn acquire_expiring_lock(store: &KvStore, lock: &str, expiry: Duration) -> Result<ExpiringLock> {
    check_key(lock)?;

    let original = store.get_time(lock).map_err(|e| {
        tracing::warn!(lock, error = %e, "failed to query lock");
        Error::storage("failed to query lock")
    })?;

    let now = Utc::now();
    if is_held(original, now, expiry) {
        return Err(Error::lock_unavailable(lock));
    }

    let taken = if original == ZERO_TIME {
        store.set_if_not_exists(lock, &now)
    } else {
        store.set_if(lock, &now, Some(&original))
    };

    match taken {
        Ok(()) => {
            tracing::debug!(lock, acquired_at = %now, "acquired lock");
            Ok(ExpiringLock {
                store: store.clone(),
                key: lock.to_string(),
                acquired_at: now,
            })
        },
        Err(Error::ConditionMismatch { .. }) => Err(Error::lock_unavailable(lock)),
        Err(e) => {
            tracing::warn!(lock, error = %e, "failed to set lock");
            Err(Error::storage("failed to set lock"))
        },
    }
}

/// True if a lock last taken at `taken_at` is still within `expiry` of `now`.
fn is_held(taken_at: DateTime<Utc>, now: DateTime<Utc>, expiry: Duration) -> bool {
    if taken_at == ZERO_TIME {
        return false;
    }
    match chrono::TimeDelta::from_std(expiry) {
        Ok(expiry) => now.signed_duration_since(taken_at) < expiry,
        // Expiry beyond the representable range never lapses
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{Condition, DurableBackend, EngineError, Record, RecordEngine};
    use chrono::TimeDelta;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_is_held() {
        let now = Utc::now();
        assert!(!is_held(ZERO_TIME, now, TTL));
        assert!(!is_held(CLEARED_LOCK, now, TTL));
        assert!(is_held(now - TimeDelta::seconds(10), now, TTL));
        assert!(!is_held(now - TimeDelta::seconds(61), now, TTL));
    }

    #[test]
    fn test_cleared_sentinel_differs_from_zero_time() {
        assert_ne!(CLEARED_LOCK, ZERO_TIME);
    }

    #[test]
    fn test_acquire_fresh_lock() {
        let store = KvStore::memory();
        let lock = acquire_expiring_lock(&store, "lock", TTL).unwrap();

        assert_eq!(store.get_time("lock").unwrap(), lock.acquired_at());
    }

    #[test]
    fn test_acquire_held_lock_fails() {
        let store = KvStore::memory();
        let _lock = acquire_expiring_lock(&store, "lock", TTL).unwrap();

        let err = acquire_expiring_lock(&store, "lock", TTL).unwrap_err();
        assert!(matches!(err, Error::LockUnavailable { .. }));
    }

    #[test]
    fn test_release_then_reacquire() {
        let store = KvStore::memory();
        let lock = acquire_expiring_lock(&store, "lock", TTL).unwrap();
        lock.release().unwrap();

        assert_eq!(store.get_time("lock").unwrap(), CLEARED_LOCK);

        // Cleared lock goes through the compare-and-set path
        let again = acquire_expiring_lock(&store, "lock", TTL).unwrap();
        assert_eq!(store.get_time("lock").unwrap(), again.acquired_at());
    }

    #[test]
    fn test_expired_lock_is_taken_over() {
        let store = KvStore::memory();
        let ttl = Duration::from_millis(20);
        let _abandoned = acquire_expiring_lock(&store, "lock", ttl).unwrap();

        thread::sleep(Duration::from_millis(40));

        let lock = acquire_expiring_lock(&store, "lock", ttl).unwrap();
        assert_eq!(store.get_time("lock").unwrap(), lock.acquired_at());
    }

    #[test]
    fn test_release_after_takeover_keeps_new_holder() {
        let store = KvStore::memory();
        let ttl = Duration::from_millis(20);
        let first = acquire_expiring_lock(&store, "lock", ttl).unwrap();

        thread::sleep(Duration::from_millis(40));
        let second = acquire_expiring_lock(&store, "lock", ttl).unwrap();

        first.release().unwrap();
        assert_eq!(store.get_time("lock").unwrap(), second.acquired_at());
    }

    #[test]
    fn test_lock_value_of_wrong_type_is_storage_failure() {
        let store = KvStore::memory();
        store.set("lock", "not a timestamp").unwrap();

        let err = acquire_expiring_lock(&store, "lock", TTL).unwrap_err();
        assert!(matches!(err, Error::StorageFailure(_)));
    }

    /// Engine whose reads always work and whose writes fail on demand.
    #[derive(Default)]
    struct FlakyWrites {
        records: Mutex<HashMap<String, Record>>,
        fail_writes: Arc<AtomicBool>,
    }

    impl RecordEngine for FlakyWrites {
        fn put_item(
            &self,
            _table: &str,
            record: &Record,
            condition: Option<&Condition>,
        ) -> std::result::Result<(), EngineError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("throughput exceeded").into());
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
            Ok(self.records.lock().get(key).cloned())
        }

        fn delete_item(&self, _table: &str, key: &str) -> std::result::Result<(), EngineError> {
            self.records.lock().remove(key);
            Ok(())
        }
    }

    fn flaky_store() -> (KvStore, Arc<AtomicBool>) {
        let engine = FlakyWrites::default();
        let fail_writes = Arc::clone(&engine.fail_writes);
        let store = KvStore::custom(DurableBackend::new(engine, "locks"));
        (store, fail_writes)
    }

    #[test]
    fn test_failed_acquire_write_is_storage_failure() {
        let (store, fail_writes) = flaky_store();
        fail_writes.store(true, Ordering::SeqCst);

        // Never-written lock goes through set_if_not_exists
        let err = acquire_expiring_lock(&store, "lock", TTL).unwrap_err();
        assert!(matches!(err, Error::StorageFailure(_)), "{err:?}");

        // Cleared lock goes through set_if
        fail_writes.store(false, Ordering::SeqCst);
        store.set("lock", &CLEARED_LOCK).unwrap();
        fail_writes.store(true, Ordering::SeqCst);
        let err = acquire_expiring_lock(&store, "lock", TTL).unwrap_err();
        assert!(matches!(err, Error::StorageFailure(_)), "{err:?}");
    }

    #[test]
    fn test_failed_release_is_storage_failure() {
        let (store, fail_writes) = flaky_store();
        let lock = acquire_expiring_lock(&store, "lock", TTL).unwrap();
        let acquired_at = lock.acquired_at();

        fail_writes.store(true, Ordering::SeqCst);
        let err = lock.release().unwrap_err();
        assert!(matches!(err, Error::StorageFailure(_)), "{err:?}");

        // The holder's timestamp is still in place
        assert_eq!(store.get_time("lock").unwrap(), acquired_at);
    }
}
