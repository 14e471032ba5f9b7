//! Configuration types
//!
//! Configuration objects are plain values owned by the composing
//! application and passed to the orchestrator and locker explicitly. They can
//! be built in code, parsed from TOML, or read from `CORRAL_*` environment
//! variables with defaults for anything unset.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, CorralResult};

/// Serde helper storing a [`Duration`] as fractional seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// CACHE-ASIDE ORCHESTRATOR
// ============================================================================

/// Settings for the cache-aside orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachedConfig {
    /// TTL for entries written by the orchestrator. Zero never expires.
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
    /// Upper bound for single-flight leases and for how long non-owners wait.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Namespace partition; `None` uses the backend default.
    pub namespace: Option<String>,
    /// Prefix for keys derived from wrapped function calls.
    pub key_prefix: String,
}

impl Default for CachedConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::ZERO,
            timeout: Duration::from_secs(10),
            namespace: None,
            key_prefix: "corral".to_string(),
        }
    }
}

impl CachedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the single-flight timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the namespace partition.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the derived key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Check invariants the orchestrator relies on.
    pub fn validate(&self) -> CorralResult<()> {
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "cached.timeout".to_string(),
                value: "0".to_string(),
                reason: "single-flight waits must be bounded by a positive timeout".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

// ============================================================================
// LOCKOUT
// ============================================================================

/// Settings shared by every lockout a locker defines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockerConfig {
    /// Prefix for counter and lock-marker keys.
    pub key_prefix: String,
    /// Namespace partition; `None` uses the backend default.
    pub namespace: Option<String>,
}

impl Default for LockerConfig {
    fn default() -> Self {
        Self {
            key_prefix: "lockout".to_string(),
            namespace: None,
        }
    }
}

impl LockerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the namespace partition.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn validate(&self) -> CorralResult<()> {
        if self.key_prefix.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "locker.key_prefix".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Thresholds for one lockout dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterConfig {
    /// Number of counted events within `period` that triggers a lock.
    pub count: u64,
    /// Window over which events are counted.
    #[serde(with = "duration_secs")]
    pub period: Duration,
    /// How long the dimension stays locked.
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// Whether `reset` (and success under `guard`) clears this dimension.
    pub reset: bool,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            count: 10,
            period: Duration::from_secs(60),
            duration: Duration::from_secs(2 * 60 * 60),
            reset: false,
        }
    }
}

impl CounterConfig {
    pub fn validate(&self, dimension: &str) -> CorralResult<()> {
        if self.count == 0 {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.count", dimension),
                value: "0".to_string(),
                reason: "threshold must be at least 1".to_string(),
            }
            .into());
        }
        for (field, value) in [("period", self.period), ("duration", self.duration)] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.{}", dimension, field),
                    value: "0".to_string(),
                    reason: "a zero TTL would never expire".to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

// ============================================================================
// MASTER CONFIGURATION
// ============================================================================

/// Master configuration for an application using corral.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorralConfig {
    pub cached: CachedConfig,
    pub locker: LockerConfig,
}

impl CorralConfig {
    /// Parse configuration from a TOML document.
    ///
    /// ```toml
    /// [cached]
    /// ttl = 300
    /// timeout = 5
    /// namespace = "pages"
    ///
    /// [locker]
    /// key_prefix = "auth"
    /// ```
    pub fn from_toml_str(source: &str) -> CorralResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CORRAL_CACHE_TTL_SECS`: entry TTL (default: 0, no expiry)
    /// - `CORRAL_CACHE_TIMEOUT_SECS`: single-flight timeout (default: 10)
    /// - `CORRAL_CACHE_NAMESPACE`: orchestrator namespace (default: none)
    /// - `CORRAL_CACHE_KEY_PREFIX`: derived key prefix (default: "corral")
    /// - `CORRAL_LOCKOUT_KEY_PREFIX`: lockout key prefix (default: "lockout")
    /// - `CORRAL_LOCKOUT_NAMESPACE`: lockout namespace (default: none)
    pub fn from_env() -> CorralResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CorralResult<Self> {
        let defaults = Self::default();

        let secs = |name: &str, default: Duration| -> CorralResult<Duration> {
            match lookup(name) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(|s| Duration::try_from_secs_f64(s).ok())
                    .ok_or_else(|| {
                        ConfigError::InvalidValue {
                            field: name.to_string(),
                            value: raw.clone(),
                            reason: "expected non-negative seconds".to_string(),
                        }
                        .into()
                    }),
            }
        };
        let non_empty = |name: &str| lookup(name).filter(|s| !s.trim().is_empty());

        let config = Self {
            cached: CachedConfig {
                ttl: secs("CORRAL_CACHE_TTL_SECS", defaults.cached.ttl)?,
                timeout: secs("CORRAL_CACHE_TIMEOUT_SECS", defaults.cached.timeout)?,
                namespace: non_empty("CORRAL_CACHE_NAMESPACE"),
                key_prefix: non_empty("CORRAL_CACHE_KEY_PREFIX")
                    .unwrap_or(defaults.cached.key_prefix),
            },
            locker: LockerConfig {
                key_prefix: non_empty("CORRAL_LOCKOUT_KEY_PREFIX")
                    .unwrap_or(defaults.locker.key_prefix),
                namespace: non_empty("CORRAL_LOCKOUT_NAMESPACE"),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CorralResult<()> {
        self.cached.validate()?;
        self.locker.validate()
    }
}
