//! Throttled message emission.
//!
//! Forwards a message at most once per period across every process sharing
//! the cache. Typical use is keeping a noisy alert or log line from flooding
//! its sink.

use std::sync::Arc;
use std::time::Duration;

use corral_core::{CachePort, CacheValue, CorralResult};
use sha2::{Digest, Sha256};

const KEY_PREFIX: &str = "one_pass_emit:";

/// Emits each distinct message at most once per `period`.
pub struct OnePassEmitter<C: CachePort + ?Sized> {
    cache: Arc<C>,
    period: Duration,
    namespace: Option<String>,
}

impl<C: CachePort + ?Sized> OnePassEmitter<C> {
    pub fn new(cache: Arc<C>, period: Duration, namespace: Option<&str>) -> Self {
        Self {
            cache,
            period,
            namespace: namespace.map(str::to_string),
        }
    }

    /// Cache key that throttles `message`.
    pub fn key_for(message: &str) -> String {
        let digest = hex::encode(Sha256::digest(message.as_bytes()));
        format!("{}{}", KEY_PREFIX, &digest[..16])
    }

    /// Hand `message` to `sink` unless it was already emitted this period.
    ///
    /// Returns whether the sink was called.
    pub async fn emit<S>(&self, message: &str, sink: S) -> CorralResult<bool>
    where
        S: FnOnce(&str),
    {
        let first = self
            .cache
            .add(
                &Self::key_for(message),
                CacheValue::from(1),
                self.period,
                self.namespace.as_deref(),
            )
            .await?;
        if first {
            sink(message);
        }
        Ok(first)
    }
}

impl<C: CachePort + ?Sized> std::fmt::Debug for OnePassEmitter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnePassEmitter")
            .field("period", &self.period)
            .field("namespace", &self.namespace)
            .finish()
    }
}
