//! Disabled lockouts.
//!
//! Same surface as [`Locker`](crate::Locker) and [`Lockout`](crate::Lockout)
//! with no enforcement: every action runs and nothing is counted.

use std::future::Future;

use async_trait::async_trait;
use corral_core::CorralResult;

use crate::counter::CounterOverrides;
use crate::guard::LockoutGuard;

/// Defines [`NullLockout`]s for any dimension list.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLocker;

impl NullLocker {
    pub fn new() -> Self {
        Self
    }

    pub fn define<I, D>(&self, _name: impl Into<String>, _dimensions: I) -> CorralResult<NullLockout>
    where
        I: IntoIterator<Item = (D, CounterOverrides)>,
        D: AsRef<str>,
    {
        Ok(NullLockout)
    }
}

/// A lockout that never locks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLockout;

#[async_trait]
impl<S: Sync, R: Send> LockoutGuard<S, R> for NullLockout {
    async fn forbid_locked<F, Fut>(&self, _subject: &S, action: F) -> CorralResult<R>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = R> + Send,
    {
        Ok(action().await)
    }

    async fn forbid_locked_with<G, F, Fut>(
        &self,
        _subject: &S,
        _forbid: G,
        action: F,
    ) -> CorralResult<R>
    where
        G: FnOnce(&S) -> R + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = R> + Send,
    {
        Ok(action().await)
    }

    async fn guard<F, Fut>(&self, _subject: &S, action: F) -> CorralResult<bool>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = bool> + Send,
    {
        Ok(action().await)
    }

    async fn quota<F, Fut>(&self, _subject: &S, action: F) -> CorralResult<bool>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = bool> + Send,
    {
        Ok(action().await)
    }

    async fn incr(&self, _subject: &S) -> CorralResult<()> {
        Ok(())
    }

    async fn reset(&self, _subject: &S) -> CorralResult<()> {
        Ok(())
    }

    async fn force_reset(&self, _subject: &S) -> CorralResult<()> {
        Ok(())
    }
}
