use thiserror::Error;

/// Main error type for cache operations and cache construction
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Unknown cache type: {0}")]
    UnknownCacheType(String),

    #[error("Invalid configuration for cache '{id}': {reason}")]
    InvalidConfig { id: String, reason: String },

    #[error("Operation against a key holding the wrong kind of value: {0}")]
    WrongType(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Invalid key pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl CacheError {
    /// Shorthand for a configuration error attributed to cache `id`
    pub fn invalid_config(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error happened while building a cache rather than while using one
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownCacheType(_)
                | Self::InvalidConfig { .. }
                | Self::Regex(_)
                | Self::Yaml(_)
        )
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
