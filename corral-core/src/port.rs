//! Cache port trait and value encoding helpers.
//!
//! This module defines the contract every cache backend must satisfy for the
//! coordination patterns to work. The patterns never touch storage directly;
//! they only issue the primitive operations below.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CodecError, CorralResult};

/// Opaque value stored in a cache entry.
pub type CacheValue = serde_json::Value;

/// Time-to-live that never expires.
pub const NO_EXPIRY: Duration = Duration::ZERO;

/// Atomic key-value cache backend.
///
/// Implementations must be safe to call from many concurrent tasks, possibly
/// in different processes. The coordination layer relies on exactly two
/// atomicity guarantees:
///
/// - `add` succeeds if and only if the key is absent.
/// - `incr` / `decr` mutate a numeric value atomically.
///
/// # TTL
///
/// A `ttl` of [`NO_EXPIRY`] keeps the entry until it is deleted or evicted.
///
/// # Namespaces
///
/// Every operation takes an optional namespace partition. `None` selects the
/// backend's default partition.
#[async_trait]
pub trait CachePort: Send + Sync {
    /// Look up a single key.
    async fn get(&self, key: &str, namespace: Option<&str>) -> CorralResult<Option<CacheValue>>;

    /// Look up several keys in one operation.
    ///
    /// Only keys that are present appear in the returned map.
    async fn get_multi(
        &self,
        keys: &[String],
        namespace: Option<&str>,
    ) -> CorralResult<HashMap<String, CacheValue>>;

    /// Set a value regardless of previous contents.
    async fn set(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<bool>;

    /// Set several values. Returns the keys that failed to store.
    async fn set_multi(
        &self,
        mapping: HashMap<String, CacheValue>,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<Vec<String>>;

    /// Store a value only if the key is absent.
    async fn add(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<bool>;

    /// Add several values. Returns the keys that were already present.
    async fn add_multi(
        &self,
        mapping: HashMap<String, CacheValue>,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<Vec<String>>;

    /// Replace a value only if the key is present.
    async fn replace(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<bool>;

    /// Replace several values. Returns the keys that were absent.
    async fn replace_multi(
        &self,
        mapping: HashMap<String, CacheValue>,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> CorralResult<Vec<String>>;

    /// Delete a key. Returns `true` if an entry was removed.
    async fn delete(&self, key: &str, namespace: Option<&str>) -> CorralResult<bool>;

    /// Delete several keys. Returns `true` once the batch was processed.
    async fn delete_multi(&self, keys: &[String], namespace: Option<&str>) -> CorralResult<bool>;

    /// Atomically increment a numeric value.
    ///
    /// When the key is absent and `initial_value` is given, the entry is
    /// created as `initial_value + delta`. When absent without a seed the
    /// result is `None` and nothing is stored.
    async fn incr(
        &self,
        key: &str,
        delta: u64,
        namespace: Option<&str>,
        initial_value: Option<u64>,
    ) -> CorralResult<Option<u64>>;

    /// Atomically decrement a numeric value, flooring at zero.
    async fn decr(
        &self,
        key: &str,
        delta: u64,
        namespace: Option<&str>,
        initial_value: Option<u64>,
    ) -> CorralResult<Option<u64>>;

    /// Drop every entry in every partition.
    async fn flush_all(&self) -> CorralResult<bool>;
}

/// Encode a typed value for storage under `key`.
pub fn encode_value<T: Serialize>(key: &str, value: &T) -> CorralResult<CacheValue> {
    serde_json::to_value(value).map_err(|e| {
        CodecError::Encode {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Decode a stored value read from `key`.
pub fn decode_value<T: DeserializeOwned>(key: &str, value: CacheValue) -> CorralResult<T> {
    serde_json::from_value(value).map_err(|e| {
        CodecError::Decode {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Interpret a stored value as a counter.
///
/// Returns `None` for anything that is not a non-negative integer.
pub fn as_counter(value: &CacheValue) -> Option<u64> {
    value.as_u64()
}
