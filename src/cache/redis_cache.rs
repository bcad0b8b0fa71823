//! Redis cache client
//!
//! An alternative to memcached for deployments that already run Redis.
//! Values are stored as plain strings under the key the store hands over.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;

use super::CacheClient;
use crate::error::CacheError;

/// Redis cache client
///
/// # Example
///
/// ```rust,ignore
/// use salvo_memcache_session::{MemcacheStore, RedisCache, StoreOptions};
///
/// let cache = RedisCache::from_url("redis://127.0.0.1/").await?;
/// let store = MemcacheStore::new(StoreOptions::new().with_cache(cache))?;
/// ```
pub struct RedisCache {
    conn: Arc<ConnectionManager>,
}

impl RedisCache {
    /// Create a new Redis cache
    pub async fn new(client: redis::Client) -> Result<Self, CacheError> {
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::from_connection_manager(conn))
    }

    /// Create a new Redis cache from a connection string
    pub async fn from_url(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        Self::new(client).await
    }

    /// Create a new Redis cache from an existing connection manager
    pub fn from_connection_manager(conn: ConnectionManager) -> Self {
        Self {
            conn: Arc::new(conn),
        }
    }
}

impl Clone for RedisCache {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

#[async_trait]
impl CacheClient for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = (*self.conn).clone();

        let data: Option<Vec<u8>> = conn.get(key).await?;
        Ok(data)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut conn = (*self.conn).clone();

        if ttl.is_zero() {
            conn.set::<_, _, ()>(key, value).await?;
        } else {
            // EX takes whole seconds
            let secs = ttl.as_secs().max(1);
            conn.set_ex::<_, _, ()>(key, value, secs).await?;
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = (*self.conn).clone();

        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}
