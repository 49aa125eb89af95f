//! Key-value store with pluggable backends.
//!
//! One contract ([`KvBackend`]) with two implementations:
//!
//! - **DurableBackend**: Persistent records with conditional puts and
//!   per-record expiry, over a [`RecordEngine`] (redb by default)
//! - **MemoryBackend**: Local maps with the same observable semantics
//!   (ideal for testing/embedding)
//!
//! Callers use [`KvStore`], which encodes values with serde and derives the
//! typed accessors once for every backend.
//!
//! # Example
//!
//! ```ignore
//! use kvlock::kv::KvStore;
//!
//! // In-memory (testing/embedding)
//! let store = KvStore::memory();
//! store.set("key", "value")?;
//!
//! // Persistent (production)
//! let store = KvStore::durable("data/kv.redb", "kv")?;
//! store.set_if_not_exists("key", "value")?;
//! ```
//!
//! # Custom Backends
//!
//! Implement the `KvBackend` trait to use custom storage, or implement
//! `RecordEngine` to put [`DurableBackend`] in front of another engine:
//!
//! ```ignore
//! use kvlock::kv::{DurableBackend, KvStore, RecordEngine};
//!
//! struct TableServiceEngine { /* ... */ }
//! impl RecordEngine for TableServiceEngine { /* ... */ }
//!
//! let store = KvStore::custom(DurableBackend::new(TableServiceEngine::new(), "kv"));
//! ```

mod backend;
mod durable;
mod engine;
mod memory;
mod redb;
mod store;
mod types;


// Re-export the public API
pub use backend::KvBackend;
pub use durable::DurableBackend;
pub use engine::{Condition, EngineError, RecordEngine};
pub use memory::MemoryBackend;
pub use self::redb::{DEFAULT_TABLE, RedbEngine};
pub use store::KvStore;
pub use types::{Record, ZERO_TIME};
