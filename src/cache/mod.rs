//! Cache client implementations
//!
//! The session store talks to its cache only through [`CacheClient`]; any
//! backend offering get/set/delete with a TTL can be plugged in.

mod memory;

pub use memory::MemoryCache;

#[cfg(feature = "memcache-cache")]
mod memcache_client;

#[cfg(feature = "memcache-cache")]
pub use memcache_client::{MemcacheCache, MemcacheConfig};

#[cfg(feature = "redis-cache")]
mod redis_cache;

#[cfg(feature = "redis-cache")]
pub use redis_cache::RedisCache;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::CacheError;

/// Key-value cache capability used by the session store
///
/// A TTL of zero asks for no explicit expiry: the backend applies its own
/// default, if it has one.
#[async_trait]
pub trait CacheClient: Send + Sync + 'static {
    /// Fetch a value; `Ok(None)` on a miss
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store a value, replacing any previous one
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Remove a value; removing a missing key is not an error
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}
