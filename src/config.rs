//! Configuration types for kvlock.
//!
//! Loads store settings from a TOML file:
//!
//! ```toml
//! [store]
//! backend = "redb"      # or "memory"
//! path = "data/kv.redb"
//! table = "kv"
//!
//! [lock]
//! ttl_secs = 30
//! ```
//!
//! Every field has a default, so an empty file describes a redb store at
//! `kv.redb` with table `kv` and 30-second locks.

use crate::error::{Error, Result};
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name looked up by `kvctl`.
pub const DEFAULT_CONFIG_FILE: &str = "kvlock.toml";

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Which backend a [`KvStore`](crate::kv::KvStore) is built on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    #[default]
    Redb,
}

/// Root configuration.
#[derive(Debug, Default, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub lock: LockSection,
}

/// `[store]` section.
#[derive(Debug, Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_path")]
    pub path: PathBuf,
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            path: default_path(),
            table: default_table(),
        }
    }
}

/// `[lock]` section.
#[derive(Debug, Deserialize)]
pub struct LockSection {
    #[serde(default = "default_lock_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_lock_ttl_secs(),
        }
    }
}

impl LockSection {
    /// Lock expiry as a `Duration`.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_path() -> PathBuf {
    PathBuf::from("kv.redb")
}

fn default_table() -> String {
    crate::kv::DEFAULT_TABLE.to_string()
}

fn default_lock_ttl_secs() -> u64 {
    30
}

impl StoreConfig {
    /// Configuration for an in-memory store with default lock settings.
    pub fn memory() -> Self {
        Self {
            store: StoreSection {
                backend: BackendKind::Memory,
                ..StoreSection::default()
            },
            lock: LockSection::default(),
        }
    }

    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - Fields have invalid types or an unknown backend name
    pub fn load_from<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: StoreConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if:
    /// - The table name is empty
    /// - The redb backend is selected with an empty path
    /// - The lock TTL is zero
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.store.table.is_empty() {
            errors.push("store.table cannot be empty".to_string());
        }

        if self.store.backend == BackendKind::Redb && self.store.path.as_os_str().is_empty() {
            errors.push("store.path is required for the redb backend".to_string());
        }

        if self.store.backend == BackendKind::Memory && self.store.path != default_path() {
            warnings.push(format!(
                "store.path '{}' is ignored by the memory backend",
                self.store.path.display()
            ));
        }

        if self.lock.ttl_secs == 0 {
            errors.push("lock.ttl_secs must be at least 1".to_string());
        }

        if !errors.is_empty() {
            return Err(Error::Config(format!(
                "validation failed:\n  - {}",
                errors.join("\n  - ")
            )));
        }

        Ok(ValidationResult { warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config: StoreConfig = toml::from_str("").unwrap();
        assert_eq!(config.store.backend, BackendKind::Redb);
        assert_eq!(config.store.path, PathBuf::from("kv.redb"));
        assert_eq!(config.store.table, "kv");
        assert_eq!(config.lock.ttl(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[store]
backend = "memory"
table = "configs"

[lock]
ttl_secs = 5
"#;
        let config: StoreConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store.backend, BackendKind::Memory);
        assert_eq!(config.store.table, "configs");
        assert_eq!(config.lock.ttl_secs, 5);
        assert!(!config.validate().unwrap().has_warnings());
    }

    #[test]
    fn test_parse_unknown_backend() {
        let result: std::result::Result<StoreConfig, _> = toml::from_str("[store]\nbackend = \"dynamo\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_empty_table() {
        let mut config = StoreConfig::default();
        config.store.table = String::new();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("store.table"));
    }

    #[test]
    fn test_validate_zero_lock_ttl() {
        let mut config = StoreConfig::memory();
        config.lock.ttl_secs = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lock.ttl_secs"));
    }

    #[test]
    fn test_validate_memory_path_warning() {
        let mut config = StoreConfig::memory();
        config.store.path = PathBuf::from("elsewhere.redb");

        let result = config.validate().unwrap();
        assert!(result.has_warnings());
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "[store]\npath = \"state/kv.redb\"\n").unwrap();

        let config = StoreConfig::load_from(&path).unwrap();
        assert_eq!(config.store.path, PathBuf::from("state/kv.redb"));
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = StoreConfig::load_from("/nonexistent/kvlock.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
