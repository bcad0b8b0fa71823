//! Session error types

use thiserror::Error;

/// Errors reported by a [`CacheClient`](crate::cache::CacheClient)
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The cache could not be reached, timed out, or answered with a server error
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    /// The key was rejected by the backend's key rules
    #[error("invalid cache key: {0}")]
    InvalidKey(String),
}

/// Errors that can occur during session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// Error from the cache client
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// Error during serialization/deserialization
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The store could not be configured
    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(feature = "memcache-cache")]
impl From<memcache::MemcacheError> for CacheError {
    fn from(err: memcache::MemcacheError) -> Self {
        CacheError::Unavailable(err.to_string())
    }
}

#[cfg(feature = "redis-cache")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Unavailable(err.to_string())
    }
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(err: tokio::task::JoinError) -> Self {
        CacheError::Unavailable(format!("cache task failed: {}", err))
    }
}
