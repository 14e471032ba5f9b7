//! Cache port that stores nothing.
//!
//! Writes report success and reads always miss, so every pattern built on a
//! `NullCache` degrades to calling its factory on each request.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CorralResult;
use crate::port::{CachePort, CacheValue};

/// A [`CachePort`] with no storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl NullCache {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CachePort for NullCache {
    async fn get(&self, _key: &str, _namespace: Option<&str>) -> CorralResult<Option<CacheValue>> {
        Ok(None)
    }

    async fn get_multi(
        &self,
        _keys: &[String],
        _namespace: Option<&str>,
    ) -> CorralResult<HashMap<String, CacheValue>> {
        Ok(HashMap::new())
    }

    async fn set(
        &self,
        _key: &str,
        _value: CacheValue,
        _ttl: Duration,
        _namespace: Option<&str>,
    ) -> CorralResult<bool> {
        Ok(true)
    }

    async fn set_multi(
        &self,
        _mapping: HashMap<String, CacheValue>,
        _ttl: Duration,
        _namespace: Option<&str>,
    ) -> CorralResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn add(
        &self,
        _key: &str,
        _value: CacheValue,
        _ttl: Duration,
        _namespace: Option<&str>,
    ) -> CorralResult<bool> {
        Ok(true)
    }

    async fn add_multi(
        &self,
        _mapping: HashMap<String, CacheValue>,
        _ttl: Duration,
        _namespace: Option<&str>,
    ) -> CorralResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn replace(
        &self,
        _key: &str,
        _value: CacheValue,
        _ttl: Duration,
        _namespace: Option<&str>,
    ) -> CorralResult<bool> {
        Ok(true)
    }

    async fn replace_multi(
        &self,
        _mapping: HashMap<String, CacheValue>,
        _ttl: Duration,
        _namespace: Option<&str>,
    ) -> CorralResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _key: &str, _namespace: Option<&str>) -> CorralResult<bool> {
        Ok(true)
    }

    async fn delete_multi(&self, _keys: &[String], _namespace: Option<&str>) -> CorralResult<bool> {
        Ok(true)
    }

    /// Nothing is stored, so every counter looks freshly seeded.
    async fn incr(
        &self,
        _key: &str,
        delta: u64,
        _namespace: Option<&str>,
        initial_value: Option<u64>,
    ) -> CorralResult<Option<u64>> {
        Ok(initial_value.map(|seed| seed.wrapping_add(delta)))
    }

    async fn decr(
        &self,
        _key: &str,
        delta: u64,
        _namespace: Option<&str>,
        initial_value: Option<u64>,
    ) -> CorralResult<Option<u64>> {
        Ok(initial_value.map(|seed| seed.saturating_sub(delta)))
    }

    async fn flush_all(&self) -> CorralResult<bool> {
        Ok(true)
    }
}
