//! In-memory cache client
//!
//! This is primarily for development and testing.
//! For production, use MemcacheCache or another shared cache.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::CacheClient;
use crate::error::CacheError;

struct StoredValue {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(exp) => exp > now,
            None => true,
        }
    }
}

/// In-memory cache client
///
/// Warning: This cache is not suitable for production use because:
/// - Sessions are lost on server restart
/// - Sessions are not shared across multiple server instances
/// - Memory usage grows with number of sessions
///
/// Clones share the same storage.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, StoredValue>>>,
}

impl MemoryCache {
    /// Create an empty memory cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, stored| stored.is_live(now));
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.cleanup_expired();
        self.entries.read().len()
    }

    /// Whether the cache holds no live entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check whether a live entry exists for the key
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .read()
            .get(key)
            .is_some_and(|stored| stored.is_live(Instant::now()))
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|stored| stored.is_live(Instant::now()))
            .map(|stored| stored.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        // Zero TTL never expires, as in memcached
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        let stored = StoredValue {
            value: value.to_vec(),
            expires_at,
        };

        self.entries.write().insert(key.to_string(), stored);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().remove(key);
        Ok(())
    }
}
