//! Lockout dimensions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use corral_core::CounterConfig;

/// Derives the per-subject part of a dimension's cache keys.
pub type KeyFunc<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// Called once when a dimension locks: `(subject, lockout name, counter)`.
pub type Alert<S> = Arc<dyn Fn(&S, &str, &Counter<S>) + Send + Sync>;

/// One lockout dimension: how to key a subject and when to lock it.
pub struct Counter<S> {
    key_func: KeyFunc<S>,
    config: CounterConfig,
    alert: Option<Alert<S>>,
}

impl<S> Counter<S> {
    pub fn new<K>(key_func: K, config: CounterConfig) -> Self
    where
        K: Fn(&S) -> String + Send + Sync + 'static,
    {
        Self {
            key_func: Arc::new(key_func),
            config,
            alert: None,
        }
    }

    pub fn with_alert<A>(mut self, alert: A) -> Self
    where
        A: Fn(&S, &str, &Counter<S>) + Send + Sync + 'static,
    {
        self.alert = Some(Arc::new(alert));
        self
    }

    pub fn key(&self, subject: &S) -> String {
        (self.key_func)(subject)
    }

    pub fn config(&self) -> &CounterConfig {
        &self.config
    }

    /// Events within `period` that trigger a lock.
    pub fn count(&self) -> u64 {
        self.config.count
    }

    pub fn period(&self) -> Duration {
        self.config.period
    }

    /// How long a lock lasts.
    pub fn duration(&self) -> Duration {
        self.config.duration
    }

    /// Whether `reset` clears this dimension.
    pub fn resettable(&self) -> bool {
        self.config.reset
    }

    pub(crate) fn alert(&self, subject: &S, lockout: &str) {
        if let Some(alert) = &self.alert {
            alert(subject, lockout, self);
        }
    }

    /// A copy of this dimension with `overrides` applied.
    pub fn apply(&self, overrides: &CounterOverrides) -> Self {
        let mut config = self.config.clone();
        if let Some(count) = overrides.count {
            config.count = count;
        }
        if let Some(period) = overrides.period {
            config.period = period;
        }
        if let Some(duration) = overrides.duration {
            config.duration = duration;
        }
        if let Some(reset) = overrides.reset {
            config.reset = reset;
        }
        Self {
            key_func: Arc::clone(&self.key_func),
            config,
            alert: self.alert.clone(),
        }
    }
}

impl<S> Clone for Counter<S> {
    fn clone(&self) -> Self {
        Self {
            key_func: Arc::clone(&self.key_func),
            config: self.config.clone(),
            alert: self.alert.clone(),
        }
    }
}

impl<S> fmt::Debug for Counter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter")
            .field("config", &self.config)
            .field("alert", &self.alert.is_some())
            .finish()
    }
}

/// Per-lockout adjustments to a dimension template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterOverrides {
    pub count: Option<u64>,
    pub period: Option<Duration>,
    pub duration: Option<Duration>,
    pub reset: Option<bool>,
}

impl CounterOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn period(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn reset(mut self, reset: bool) -> Self {
        self.reset = Some(reset);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct User {
        id: u32,
    }

    #[test]
    fn test_overrides_replace_only_given_fields() {
        let base = Counter::new(|u: &User| format!("by_id:{}", u.id), CounterConfig::default());
        let tuned = base.apply(&CounterOverrides::new().count(4).reset(true));

        assert_eq!(tuned.count(), 4);
        assert!(tuned.resettable());
        assert_eq!(tuned.period(), base.period());
        assert_eq!(tuned.duration(), base.duration());
        assert_eq!(tuned.key(&User { id: 7 }), "by_id:7");
    }

    #[test]
    fn test_alert_receives_lockout_name() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let counter = Counter::new(|u: &User| u.id.to_string(), CounterConfig::default())
            .with_alert(move |u: &User, name: &str, c: &Counter<User>| {
                sink.lock().unwrap().push(format!("{}:{}:{}", name, u.id, c.count()));
            });

        counter.alert(&User { id: 1 }, "login");
        assert_eq!(*seen.lock().unwrap(), vec!["login:1:10"]);
    }
}
