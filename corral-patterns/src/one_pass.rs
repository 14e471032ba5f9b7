//! Single-flight lease over a cache key.
//!
//! Uses the typestate pattern to keep the lease lifecycle honest. Entering a
//! pass yields either a [`Lease`] (this caller owns the key) or a [`Waiter`]
//! (someone else does). Only a `Lease` can be released and only a `Waiter`
//! can wait, so an owner waiting on its own lease does not compile.
//!
//! # State Transition Diagram
//!
//! ```text
//!            ┌── add succeeded ──→ Lease ─── release() ──→ (free)
//! enter() ───┤
//!            └── add failed ─────→ Waiter ── wait() ──→ true (freed) / false (timeout)
//! ```
//!
//! A lease dropped without `release()` (a cancelled or panicking owner)
//! deletes its marker on a background task when a tokio runtime is
//! available; otherwise the marker lapses with its TTL.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use corral_core::{unix_timestamp, CachePort, CacheValue, CorralResult};
use tokio::runtime::Handle;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// First poll interval while waiting on a lease.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// Upper bound for the poll interval.
pub const MAX_BACKOFF: Duration = Duration::from_millis(800);

// ============================================================================
// ONE PASS
// ============================================================================

/// A not-yet-entered single-flight pass on `key`.
pub struct OnePass<C: CachePort + ?Sized + 'static> {
    cache: Arc<C>,
    key: String,
    lease_ttl: Duration,
    namespace: Option<String>,
}

impl<C: CachePort + ?Sized + 'static> OnePass<C> {
    /// Prepare a pass. `lease_ttl` bounds how long an owner can hold the key,
    /// including owners that crash without releasing.
    pub fn new(
        cache: Arc<C>,
        key: impl Into<String>,
        lease_ttl: Duration,
        namespace: Option<&str>,
    ) -> Self {
        Self {
            cache,
            key: key.into(),
            lease_ttl,
            namespace: namespace.map(str::to_string),
        }
    }

    /// The lease key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Try to take the lease with a single atomic `add`.
    pub async fn enter(self) -> CorralResult<Pass<C>> {
        let marker = CacheValue::from(unix_timestamp());
        let acquired = self
            .cache
            .add(&self.key, marker, self.lease_ttl, self.namespace.as_deref())
            .await?;

        if acquired {
            debug!(key = %self.key, ttl = ?self.lease_ttl, "Lease acquired");
            Ok(Pass::Acquired(Lease {
                pass: self,
                released: false,
            }))
        } else {
            debug!(key = %self.key, "Lease contended");
            Ok(Pass::Contended(Waiter { pass: self }))
        }
    }
}

impl<C: CachePort + ?Sized + 'static> fmt::Debug for OnePass<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnePass")
            .field("key", &self.key)
            .field("lease_ttl", &self.lease_ttl)
            .field("namespace", &self.namespace)
            .finish()
    }
}

// ============================================================================
// PASS OUTCOMES
// ============================================================================

/// Outcome of [`OnePass::enter`].
#[derive(Debug)]
pub enum Pass<C: CachePort + ?Sized + 'static> {
    /// This caller owns the key.
    Acquired(Lease<C>),
    /// Another caller owns the key.
    Contended(Waiter<C>),
}

impl<C: CachePort + ?Sized + 'static> Pass<C> {
    pub fn acquired(&self) -> bool {
        matches!(self, Pass::Acquired(_))
    }
}

/// Exclusive ownership of a pass key.
///
/// Dropping a lease without calling [`Lease::release`] deletes the marker
/// on a background task, or leaves it to its TTL outside a runtime.
#[derive(Debug)]
pub struct Lease<C: CachePort + ?Sized + 'static> {
    pass: OnePass<C>,
    released: bool,
}

impl<C: CachePort + ?Sized + 'static> Lease<C> {
    pub fn key(&self) -> &str {
        &self.pass.key
    }

    /// Delete the lease marker so waiters can proceed.
    pub async fn release(mut self) -> CorralResult<bool> {
        self.released = true;
        let deleted = self
            .pass
            .cache
            .delete(&self.pass.key, self.pass.namespace.as_deref())
            .await?;
        debug!(key = %self.pass.key, deleted, "Lease released");
        Ok(deleted)
    }
}

impl<C: CachePort + ?Sized + 'static> Drop for Lease<C> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            warn!(
                key = %self.pass.key,
                ttl = ?self.pass.lease_ttl,
                "Lease dropped without release outside a runtime, it will expire after its ttl"
            );
            return;
        };

        warn!(key = %self.pass.key, "Lease dropped without release, deleting in background");
        let cache = Arc::clone(&self.pass.cache);
        let key = self.pass.key.clone();
        let namespace = self.pass.namespace.clone();
        handle.spawn(async move {
            if let Err(e) = cache.delete(&key, namespace.as_deref()).await {
                warn!(key = %key, error = %e, "Failed to delete abandoned lease");
            }
        });
    }
}

/// A contended pass that can wait for the owner to finish.
#[derive(Debug)]
pub struct Waiter<C: CachePort + ?Sized + 'static> {
    pass: OnePass<C>,
}

impl<C: CachePort + ?Sized + 'static> Waiter<C> {
    pub fn key(&self) -> &str {
        &self.pass.key
    }

    /// Poll until the lease is released.
    ///
    /// Returns `true` once the marker is gone and `false` if `timeout`
    /// (the lease TTL when `None`) runs out or the key is taken by a new
    /// owner in between polls.
    pub async fn wait(&self, timeout: Option<Duration>) -> CorralResult<bool> {
        let key = self.pass.key.as_str();
        let namespace = self.pass.namespace.as_deref();

        let expected = match self.pass.cache.get(key, namespace).await? {
            Some(marker) => marker,
            None => return Ok(true),
        };

        let mut remaining = timeout.unwrap_or(self.pass.lease_ttl);
        let mut backoff = INITIAL_BACKOFF;
        while !remaining.is_zero() {
            let started = Instant::now();
            sleep(backoff.min(remaining)).await;
            remaining = remaining.saturating_sub(started.elapsed());

            match self.pass.cache.get(key, namespace).await? {
                None => return Ok(true),
                Some(marker) if marker != expected => {
                    debug!(key, "Lease changed owner while waiting");
                    return Ok(false);
                }
                Some(_) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        warn!(key, "Timed out waiting for lease");
        Ok(false)
    }
}
