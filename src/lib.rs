//! kvlock - backend-agnostic key/value store with expiring locks.
//!
//! - [`kv`] - the store contract, its in-memory and durable backends, and
//!   the typed [`KvStore`] handle
//! - [`lock`] - expiring locks built only on the store's conditional writes
//! - [`config`] - TOML configuration selecting a backend
//! - [`error`] - the shared error taxonomy

pub mod config;
pub mod error;
pub mod kv;
pub mod lock;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use kv::KvStore;
pub use lock::{CLEARED_LOCK, ExpiringLock, acquire_expiring_lock};
