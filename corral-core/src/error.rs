//! Error types for corral operations

use thiserror::Error;

/// Cache port errors.
///
/// Raised by a [`CachePort`](crate::CachePort) implementation. The
/// coordination layer never retries these; they reach the caller unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend {backend} unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("Cannot increment or decrement non-numeric value at {key}")]
    NonNumeric { key: String },

    #[error("No cache registered for namespace {namespace}")]
    UnknownNamespace { namespace: String },
}

/// Value encoding errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Failed to encode value for {key}: {reason}")]
    Encode { key: String, reason: String },

    #[error("Failed to decode value at {key}: {reason}")]
    Decode { key: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unknown lockout dimension: {name}")]
    UnknownDimension { name: String },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },

    #[error("Logging already initialized: {reason}")]
    LoggingInit { reason: String },
}

/// Master error type for all corral errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CorralError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl CorralError {
    /// Shorthand for a [`CacheError::Unavailable`] raised by a port.
    pub fn unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Cache(CacheError::Unavailable {
            backend: backend.into(),
            reason: reason.into(),
        })
    }

    /// Whether a caller may sensibly retry the failed operation.
    ///
    /// Only transport failures qualify; codec and configuration errors
    /// will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cache(CacheError::Unavailable { .. }))
    }
}

/// Result type alias for corral operations.
pub type CorralResult<T> = Result<T, CorralError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_display_unavailable() {
        let err = CacheError::Unavailable {
            backend: "memcached".to_string(),
            reason: "connection refused".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("memcached"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_codec_error_display_decode() {
        let err = CodecError::Decode {
            key: "user:1".to_string(),
            reason: "expected string".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("user:1"));
        assert!(msg.contains("expected string"));
    }

    #[test]
    fn test_config_error_display_unknown_dimension() {
        let err = ConfigError::UnknownDimension {
            name: "by_device".to_string(),
        };
        assert!(format!("{}", err).contains("by_device"));
    }

    #[test]
    fn test_corral_error_from_variants() {
        let cache = CorralError::from(CacheError::NonNumeric {
            key: "k".to_string(),
        });
        assert!(matches!(cache, CorralError::Cache(_)));

        let codec = CorralError::from(CodecError::Encode {
            key: "k".to_string(),
            reason: "r".to_string(),
        });
        assert!(matches!(codec, CorralError::Codec(_)));

        let config = CorralError::from(ConfigError::MissingRequired {
            field: "timeout".to_string(),
        });
        assert!(matches!(config, CorralError::Config(_)));
    }

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(CorralError::unavailable("memory", "down").is_retryable());
        assert!(!CorralError::from(CacheError::NonNumeric {
            key: "k".to_string()
        })
        .is_retryable());
        assert!(!CorralError::from(ConfigError::Parse {
            reason: "bad".to_string()
        })
        .is_retryable());
    }
}
