//! Error types shared by the store contract, backends and the expiring lock.
//!
//! Callers doing read-modify-write cycles need to tell "nothing is stored"
//! ([`Error::NotFound`]) apart from "something is stored but it is not what
//! you expected" ([`Error::ConditionMismatch`]), so each outcome has its own
//! variant rather than a shared message.

/// Result type for store and lock operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Store and lock errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The key has no live record (never written, deleted, or expired).
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// A conditional write's predicate was not satisfied.
    #[error("record mismatch for key '{key}'")]
    ConditionMismatch { key: String },

    /// The stored value cannot be decoded into the requested type.
    #[error("failed to decode value for key '{key}': {reason}")]
    DecodeFailure { key: String, reason: String },

    /// Any other backend failure (transport, encoding, unexpected response).
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// The lock is held by another process and has not expired.
    #[error("lock '{lock}' held by other process")]
    LockUnavailable { lock: String },

    /// Keys must be non-empty.
    #[error("invalid key: keys must be non-empty")]
    InvalidKey,

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a not-found error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a condition-mismatch error.
    pub fn mismatch(key: impl Into<String>) -> Self {
        Self::ConditionMismatch { key: key.into() }
    }

    /// Create a decode failure.
    pub fn decode(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::DecodeFailure {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a storage failure.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageFailure(message.into())
    }

    /// Create a lock-unavailable error.
    pub fn lock_unavailable(lock: impl Into<String>) -> Self {
        Self::LockUnavailable { lock: lock.into() }
    }

    /// True for [`Error::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for [`Error::ConditionMismatch`].
    #[must_use]
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::ConditionMismatch { .. })
    }

    /// Process exit code used by the `kvctl` binary.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => 2,
            Self::ConditionMismatch { .. } | Self::LockUnavailable { .. } => 3,
            Self::DecodeFailure { .. } | Self::InvalidKey | Self::Config(_) => 4,
            Self::StorageFailure(_) => 1,
        }
    }
}

/// Reject empty keys before they reach a backend.
pub(crate) fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidKey);
    }
    Ok(())
}
