//! Record types and constants for the KV store.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;

/// The zero instant returned by [`KvStore::get_time`](super::KvStore::get_time)
/// for keys with no live record.
pub const ZERO_TIME: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

/// Record stored by the durable backend.
///
/// `ttl` holds the absolute expiry in seconds since the Unix epoch, the
/// granularity an engine reaps at. `expires_at` keeps the exact instant.
/// Absence of both means the record never expires.
///
/// A `value` of `Some(Value::Null)` is a stored `null`; `None` means the
/// attribute is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Maps a present attribute to `Some`, including an explicit `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Record {
    /// Builds a record stamped with the current time.
    ///
    /// A non-zero `ttl` sets `expires_at` and an absolute epoch-second `ttl`
    /// rounded up, so the engine never reaps the record before `ttl` has
    /// elapsed. A `ttl` past the representable timestamp range never expires.
    pub fn new(key: &str, value: Value, ttl: Duration) -> Self {
        let now = Utc::now();
        let expires_at = if ttl.is_zero() {
            None
        } else {
            TimeDelta::from_std(ttl)
                .ok()
                .and_then(|delta| now.checked_add_signed(delta))
        };
        let ttl = expires_at.map(|at| {
            let secs = at.timestamp();
            if at.timestamp_subsec_nanos() > 0 {
                secs + 1
            } else {
                secs
            }
        });

        Self {
            key: key.to_string(),
            value: Some(value),
            updated_at: now,
            ttl,
            expires_at,
        }
    }

    /// Returns true if the record's expiry is at or before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
            || self
                .ttl
                .is_some_and(|expires| expires > 0 && expires <= now.timestamp())
    }

    /// Returns true if the record has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
