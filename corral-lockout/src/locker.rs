//! Registry of dimension templates that lockouts are defined from.

use std::fmt;
use std::sync::Arc;

use corral_core::{CachePort, ConfigError, CorralResult, LockerConfig};

use crate::counter::{Counter, CounterOverrides};
use crate::lockout::{ForbidAction, Lockout};

/// Builds [`Lockout`]s that share a cache, key prefix and forbid action.
///
/// # Example
///
/// ```ignore
/// let locker = Locker::new(cache, LockerConfig::default(), |_: &Request| Response::forbidden())?
///     .with_counter("by_ip", Counter::new(|r: &Request| r.ip.clone(), CounterConfig::default()));
///
/// let login = locker.define("login", [("by_ip", CounterOverrides::new().count(5))])?;
/// ```
pub struct Locker<C: CachePort + ?Sized, S, R> {
    cache: Arc<C>,
    config: LockerConfig,
    forbid_action: ForbidAction<S, R>,
    templates: Vec<(String, Counter<S>)>,
}

impl<C: CachePort + ?Sized, S, R> Locker<C, S, R> {
    pub fn new<F>(cache: Arc<C>, config: LockerConfig, forbid_action: F) -> CorralResult<Self>
    where
        F: Fn(&S) -> R + Send + Sync + 'static,
    {
        config.validate()?;
        Ok(Self {
            cache,
            config,
            forbid_action: Arc::new(forbid_action),
            templates: Vec::new(),
        })
    }

    /// Register (or replace) the dimension template `name`.
    pub fn with_counter(mut self, name: impl Into<String>, counter: Counter<S>) -> Self {
        let name = name.into();
        match self.templates.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = counter,
            None => self.templates.push((name, counter)),
        }
        self
    }

    pub fn counter(&self, name: &str) -> Option<&Counter<S>> {
        self.templates
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, counter)| counter)
    }

    pub fn config(&self) -> &LockerConfig {
        &self.config
    }

    /// Define a lockout from templates, applying per-lockout overrides.
    ///
    /// Dimensions are checked in the order given.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownDimension`] for a name without a template, and
    /// [`ConfigError::InvalidValue`] when overrides produce an unusable
    /// threshold or TTL.
    pub fn define<I, D>(
        &self,
        name: impl Into<String>,
        dimensions: I,
    ) -> CorralResult<Lockout<C, S, R>>
    where
        I: IntoIterator<Item = (D, CounterOverrides)>,
        D: AsRef<str>,
    {
        let name = name.into();
        let mut counters = Vec::new();
        for (dimension, overrides) in dimensions {
            let dimension = dimension.as_ref();
            let template = self
                .counter(dimension)
                .ok_or_else(|| ConfigError::UnknownDimension {
                    name: dimension.to_string(),
                })?;
            let counter = template.apply(&overrides);
            counter
                .config()
                .validate(&format!("{}.{}", name, dimension))?;
            counters.push((dimension.to_string(), counter));
        }

        Ok(Lockout::new(
            name,
            Arc::clone(&self.cache),
            self.config.key_prefix.clone(),
            self.config.namespace.clone(),
            counters,
            Arc::clone(&self.forbid_action),
        ))
    }
}

impl<C: CachePort + ?Sized, S, R> fmt::Debug for Locker<C, S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locker")
            .field("config", &self.config)
            .field("templates", &self.templates)
            .finish()
    }
}
