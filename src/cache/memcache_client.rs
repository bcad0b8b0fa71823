//! Memcached cache client
//!
//! Wraps the blocking `memcache` client; every call runs on tokio's blocking
//! pool. Each server gets its own connection pool, opened on first use, so a
//! store can be built while the servers are still down. A server that cannot
//! be reached is marked down and skipped until its retry delay has passed.

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use super::CacheClient;
use crate::config::DEFAULT_MEMCACHE_SERVER;
use crate::error::CacheError;

/// Longest key memcached accepts
const MAX_KEY_LENGTH: usize = 250;

/// Expirations above this many seconds are read by memcached as unix timestamps
const MAX_RELATIVE_EXPIRATION: u64 = 30 * 24 * 60 * 60;

const DIGEST_MARKER: &str = ":sha256:";

/// How long to wait for a pooled connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a server stays marked down after a failed connect
pub const DEFAULT_DOWN_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Connections kept per server
pub const DEFAULT_POOL_SIZE: u32 = 4;

/// Configuration for [`MemcacheCache`]
#[derive(Clone, Debug, PartialEq)]
pub struct MemcacheConfig {
    /// Server addresses, `host:port` or `memcache://host:port`
    pub servers: Vec<String>,
    /// Expiry used when a write asks for no explicit TTL
    pub expires_in: Option<Duration>,
    /// Socket read/write timeout
    pub timeout: Option<Duration>,
    /// Upper bound for obtaining a connection, including the first connect
    pub connect_timeout: Duration,
    /// Time a server is skipped after it could not be reached
    pub down_retry_delay: Duration,
    /// Maximum connections per server
    pub pool_size: u32,
}

impl Default for MemcacheConfig {
    fn default() -> Self {
        Self {
            servers: vec![DEFAULT_MEMCACHE_SERVER.to_string()],
            expires_in: None,
            timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            down_retry_delay: DEFAULT_DOWN_RETRY_DELAY,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl MemcacheConfig {
    /// Create a configuration for the given servers
    pub fn new<I, S>(servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            servers: servers.into_iter().map(|s| s.into()).collect(),
            ..Default::default()
        }
    }

    /// Set the default expiry
    pub fn with_expires_in(mut self, expires_in: impl Into<Option<Duration>>) -> Self {
        self.expires_in = expires_in.into();
        self
    }

    /// Set the socket timeout
    pub fn with_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Set the connect timeout (default: 1 second)
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Set how long an unreachable server is skipped (default: 5 seconds)
    pub fn with_down_retry_delay(mut self, delay: Duration) -> Self {
        self.down_retry_delay = delay;
        self
    }

    /// Set the maximum connections per server (default: 4)
    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    /// Server addresses as `memcache://` URLs
    pub fn urls(&self) -> Vec<String> {
        self.servers.iter().map(|s| server_url(s)).collect()
    }
}

#[derive(Clone)]
enum ServerState {
    Idle,
    Connected(Arc<memcache::Client>),
    Down { until: Instant },
}

struct Server {
    url: String,
    state: Mutex<ServerState>,
}

/// Memcached cache client
///
/// Keys are spread over the configured servers by hash. Clones share the
/// same connection pools.
#[derive(Clone)]
pub struct MemcacheCache {
    config: Arc<MemcacheConfig>,
    servers: Arc<Vec<Server>>,
}

impl MemcacheCache {
    /// Create a client; no connection is made until the first operation
    pub fn new(config: MemcacheConfig) -> Self {
        let servers = config
            .urls()
            .into_iter()
            .map(|url| Server {
                url,
                state: Mutex::new(ServerState::Idle),
            })
            .collect();
        Self {
            config: Arc::new(config),
            servers: Arc::new(servers),
        }
    }

    /// Create a client for a single server with default settings
    pub fn from_server<S: Into<String>>(server: S) -> Self {
        Self::new(MemcacheConfig::new([server]))
    }

    /// Settings this client was built with
    pub fn config(&self) -> &MemcacheConfig {
        &self.config
    }

    fn server_index(&self, key: &str) -> usize {
        server_index(key, self.servers.len())
    }

    async fn client(&self, index: usize) -> Result<Arc<memcache::Client>, CacheError> {
        let server = self
            .servers
            .get(index)
            .ok_or_else(|| CacheError::Unavailable("no memcache server configured".to_string()))?;

        let state = server.state.lock().clone();
        match state {
            ServerState::Connected(client) => return Ok(client),
            ServerState::Down { until } if Instant::now() < until => {
                return Err(CacheError::Unavailable(format!(
                    "{} is marked down",
                    server.url
                )));
            }
            _ => {}
        }

        let url = server.url.clone();
        let config = Arc::clone(&self.config);
        tracing::debug!(server = %url, "connecting to memcached");

        let connected = tokio::task::spawn_blocking(move || connect(&url, &config)).await?;
        match connected {
            Ok(client) => {
                let client = Arc::new(client);
                *server.state.lock() = ServerState::Connected(Arc::clone(&client));
                Ok(client)
            }
            Err(e) => {
                tracing::debug!(server = %server.url, error = %e, "marking memcached server down");
                *server.state.lock() = ServerState::Down {
                    until: Instant::now() + self.config.down_retry_delay,
                };
                Err(e)
            }
        }
    }

    /// Drop a pool after a failed command; the next call reconnects
    fn reset(&self, index: usize) {
        if let Some(server) = self.servers.get(index) {
            let mut state = server.state.lock();
            if matches!(*state, ServerState::Connected(_)) {
                *state = ServerState::Idle;
            }
        }
    }

    async fn run<T, F>(&self, key: &str, op: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&memcache::Client, &str) -> Result<T, memcache::MemcacheError> + Send + 'static,
    {
        let key = memcache_key(key)?.into_owned();
        let index = self.server_index(&key);
        let client = self.client(index).await?;

        let result = tokio::task::spawn_blocking(move || op(&client, &key)).await?;
        result.map_err(|e| {
            self.reset(index);
            CacheError::from(e)
        })
    }
}

#[async_trait]
impl CacheClient for MemcacheCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.run(key, |client, key| client.get::<Vec<u8>>(key)).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let value = value.to_vec();
        let expiration = expiration(ttl, self.config.expires_in, unix_now());

        self.run(key, move |client, key| client.set(key, &value[..], expiration))
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        // `false` only means the key was already gone
        self.run(key, |client, key| client.delete(key).map(|_existed| ()))
            .await
    }
}

/// Open a bounded connection pool to one server
fn connect(url: &str, config: &MemcacheConfig) -> Result<memcache::Client, CacheError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| CacheError::Unavailable(format!("invalid server url {}: {}", url, e)))?;
    let pool = r2d2::Pool::builder()
        .max_size(config.pool_size)
        .min_idle(Some(1))
        .connection_timeout(config.connect_timeout)
        .build(memcache::ConnectionManager::new(parsed))
        .map_err(|e| CacheError::Unavailable(format!("{}: {}", url, e)))?;

    let client = memcache::Client::with_pool(pool)?;
    if config.timeout.is_some() {
        client.set_read_timeout(config.timeout)?;
        client.set_write_timeout(config.timeout)?;
    }
    Ok(client)
}

/// Pick the server responsible for a key
fn server_index(key: &str, servers: usize) -> usize {
    if servers <= 1 {
        return 0;
    }
    let digest = Sha256::digest(key.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % servers as u64) as usize
}

/// Add the `memcache://` scheme to bare `host:port` addresses
fn server_url(server: &str) -> String {
    if server.contains("://") {
        server.to_string()
    } else {
        format!("memcache://{}", server)
    }
}

/// Map a cache key onto memcached's key rules
fn memcache_key(key: &str) -> Result<Cow<'_, str>, CacheError> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key is empty".to_string()));
    }
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CacheError::InvalidKey(format!(
            "key contains whitespace or control characters: {:?}",
            key
        )));
    }
    if key.len() <= MAX_KEY_LENGTH {
        return Ok(Cow::Borrowed(key));
    }

    let digest: String = Sha256::digest(key.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    let mut end = MAX_KEY_LENGTH - DIGEST_MARKER.len() - digest.len();
    while !key.is_char_boundary(end) {
        end -= 1;
    }
    tracing::debug!(length = key.len(), "hashing over-long memcached key");
    Ok(Cow::Owned(format!("{}{}{}", &key[..end], DIGEST_MARKER, digest)))
}

/// Memcached expiration field for a TTL
fn expiration(ttl: Duration, default: Option<Duration>, now_secs: u64) -> u32 {
    let ttl = if ttl.is_zero() {
        default.unwrap_or(Duration::ZERO)
    } else {
        ttl
    };
    if ttl.is_zero() {
        return 0;
    }

    // Round sub-second TTLs up so they do not turn into "never expires"
    let secs = ttl.as_secs().max(1);
    if secs <= MAX_RELATIVE_EXPIRATION {
        secs as u32
    } else {
        u32::try_from(now_secs.saturating_add(secs)).unwrap_or(u32::MAX)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
