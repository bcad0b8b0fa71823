//! Memcache-backed session store
//!
//! Sessions live under `namespace:session_id` in the cache as JSON objects.
//! Cache failures never reach the host: loads fall back to an empty session,
//! saves and destroys report `None`/`false`, and every failure is logged.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::SessionStore;
use crate::cache::CacheClient;
use crate::config::{DefaultOptions, SessionOptions, StoreOptions};
use crate::env::SessionEnv;
use crate::error::SessionError;
use crate::logger::{SessionLogger, TracingLogger};
use crate::session::SessionData;

/// Session store keeping sessions in memcached (or any [`CacheClient`])
///
/// Cheap to clone; clones share the cache client.
///
/// # Example
///
/// ```rust,ignore
/// use salvo_memcache_session::{MemcacheStore, StoreOptions};
/// use std::time::Duration;
///
/// let store = MemcacheStore::new(
///     StoreOptions::new()
///         .with_memcache_servers(["cache-1:11211", "cache-2:11211"])
///         .with_expire_after(Duration::from_secs(14 * 24 * 3600)),
/// )?;
/// ```
#[derive(Clone)]
pub struct MemcacheStore {
    cache: Arc<dyn CacheClient>,
    namespace: Option<String>,
    default_options: DefaultOptions,
    request_options: SessionOptions,
    logger: Arc<dyn SessionLogger>,
}

impl MemcacheStore {
    /// Build a store from construction options
    ///
    /// No connection is made here; an injected `cache` is used as is,
    /// otherwise a memcache client is set up for the configured servers.
    pub fn new(options: StoreOptions) -> Result<Self, SessionError> {
        let options = options.normalize();
        let request_options = SessionOptions::new().with_expire_after(options.expire_after);
        let default_options = DefaultOptions::resolve(
            DefaultOptions::default(),
            &options.caller_layer(),
            &options.inherited,
        );

        let cache = match options.cache {
            Some(cache) => cache,
            None => default_cache(&default_options)?,
        };
        let logger = options
            .logger
            .unwrap_or_else(|| Arc::new(TracingLogger) as Arc<dyn SessionLogger>);

        Ok(Self {
            cache,
            namespace: default_options.namespace.clone(),
            default_options,
            request_options,
            logger,
        })
    }

    /// Resolved store settings
    pub fn default_options(&self) -> &DefaultOptions {
        &self.default_options
    }

    /// Options a host should attach to each request by default
    pub fn request_options(&self) -> SessionOptions {
        self.request_options.clone()
    }

    /// Key namespace, if one is configured
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Cache key for a session id
    pub fn session_key(&self, sid: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{}:{}", namespace, sid),
            None => sid.to_string(),
        }
    }

    /// Load session data, reporting cache and decoding failures
    pub async fn try_get_session(&self, sid: &str) -> Result<SessionData, SessionError> {
        match self.cache.get(&self.session_key(sid)).await? {
            Some(bytes) => SessionData::from_bytes(&bytes),
            None => Ok(SessionData::new()),
        }
    }

    /// Save session data, reporting cache and encoding failures
    pub async fn try_set_session(
        &self,
        env: &dyn SessionEnv,
        sid: &str,
        session: &SessionData,
    ) -> Result<String, SessionError> {
        let ttl = env
            .session_options()
            .and_then(|options| options.expire_after)
            .unwrap_or(Duration::ZERO);
        let bytes = session.to_bytes()?;

        self.cache.set(&self.session_key(sid), &bytes, ttl).await?;
        Ok(sid.to_string())
    }

    /// Delete the current session, reporting cache failures
    pub async fn try_destroy(&self, env: &dyn SessionEnv) -> Result<(), SessionError> {
        if let Some(sid) = env.current_session_id() {
            self.cache.delete(&self.session_key(sid)).await?;
        }
        Ok(())
    }

    /// Log a failure and turn it into `None`
    fn contain<T>(&self, result: Result<T, SessionError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.logger.warn(&format!("Session::MemcacheStore: {}", e));
                None
            }
        }
    }
}

#[cfg(feature = "memcache-cache")]
fn default_cache(options: &DefaultOptions) -> Result<Arc<dyn CacheClient>, SessionError> {
    Ok(Arc::new(crate::cache::MemcacheCache::new(memcache_config(options)?)))
}

/// Client configuration for the resolved store settings
#[cfg(feature = "memcache-cache")]
fn memcache_config(options: &DefaultOptions) -> Result<crate::cache::MemcacheConfig, SessionError> {
    if options.memcache_server.is_empty() {
        return Err(SessionError::Config("no memcache server configured".to_string()));
    }
    let mut config = crate::cache::MemcacheConfig::new(options.memcache_server.iter().cloned())
        .with_expires_in(options.expires_in)
        .with_timeout(options.socket_timeout);
    if let Some(connect_timeout) = options.connect_timeout {
        config = config.with_connect_timeout(connect_timeout);
    }
    Ok(config)
}

#[cfg(not(feature = "memcache-cache"))]
fn default_cache(_options: &DefaultOptions) -> Result<Arc<dyn CacheClient>, SessionError> {
    Err(SessionError::Config(
        "no cache client given and the memcache-cache feature is disabled".to_string(),
    ))
}

#[async_trait]
impl SessionStore for MemcacheStore {
    async fn get_session(&self, _env: &dyn SessionEnv, sid: &str) -> (String, SessionData) {
        let session = self
            .contain(self.try_get_session(sid).await)
            .unwrap_or_default();
        (sid.to_string(), session)
    }

    async fn set_session(
        &self,
        env: &dyn SessionEnv,
        sid: &str,
        session: &SessionData,
    ) -> Option<String> {
        self.contain(self.try_set_session(env, sid, session).await)
    }

    async fn destroy(&self, env: &dyn SessionEnv) -> bool {
        self.contain(self.try_destroy(env).await).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::OptionLayer;
    use crate::depot_ext::SessionDepotExt;
    use crate::error::CacheError;
    use parking_lot::Mutex;
    use salvo_core::Depot;
    use serde_json::json;

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        Get(String),
        Set(String, Duration),
        Delete(String),
    }

    /// Memory cache that records calls and can be switched into failure
    #[derive(Clone, Default)]
    struct RecordingCache {
        inner: MemoryCache,
        calls: Arc<Mutex<Vec<Call>>>,
        down: Arc<Mutex<bool>>,
    }

    impl RecordingCache {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn take_down(&self) {
            *self.down.lock() = true;
        }

        fn check(&self) -> Result<(), CacheError> {
            if *self.down.lock() {
                Err(CacheError::Unavailable("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CacheClient for RecordingCache {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            self.calls.lock().push(Call::Get(key.to_string()));
            self.check()?;
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
            self.calls.lock().push(Call::Set(key.to_string(), ttl));
            self.check()?;
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            self.calls.lock().push(Call::Delete(key.to_string()));
            self.check()?;
            self.inner.delete(key).await
        }
    }

    #[derive(Clone, Default)]
    struct RecordingLogger {
        messages: Arc<Mutex<Vec<String>>>,
    }

    impl SessionLogger for RecordingLogger {
        fn warn(&self, message: &str) {
            self.messages.lock().push(message.to_string());
        }
    }

    fn store_with(options: StoreOptions) -> (MemcacheStore, RecordingCache, RecordingLogger) {
        let cache = RecordingCache::default();
        let logger = RecordingLogger::default();
        let store = MemcacheStore::new(
            options
                .with_cache(cache.clone())
                .with_logger(logger.clone()),
        )
        .unwrap();
        (store, cache, logger)
    }

    fn sample_session() -> SessionData {
        let mut data = SessionData::new();
        data.set("user_id", 42);
        data.set("roles", vec!["admin", "editor"]);
        data.set("profile", json!({ "name": "alice", "tz": null }));
        data
    }

    #[test]
    fn test_session_key_with_namespace() {
        let (store, _, _) = store_with(StoreOptions::new());
        assert_eq!(store.session_key("abc"), "rack:session:abc");
        assert_eq!(store.session_key("abc"), store.session_key("abc"));

        let (store, _, _) = store_with(StoreOptions::new().with_namespace("myapp"));
        assert_eq!(store.session_key("abc"), "myapp:abc");
    }

    #[test]
    fn test_session_key_without_namespace() {
        let (store, _, _) = store_with(StoreOptions::new().without_namespace());
        assert_eq!(store.namespace(), None);
        assert_eq!(store.session_key("abc"), "abc");
    }

    #[test]
    fn test_session_key_with_empty_namespace() {
        let (store, _, _) = store_with(StoreOptions::new().with_namespace(""));
        assert_eq!(store.session_key("abc"), ":abc");
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (store, _, logger) = store_with(StoreOptions::new());
        let env = SessionOptions::new();
        let data = sample_session();

        let saved = store.set_session(&env, "sid-1", &data).await;
        assert_eq!(saved.as_deref(), Some("sid-1"));

        let (sid, loaded) = store.get_session(&env, "sid-1").await;
        assert_eq!(sid, "sid-1");
        assert_eq!(loaded, data);
        assert!(logger.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_miss_returns_empty_session() {
        let (store, cache, logger) = store_with(StoreOptions::new());

        let (sid, data) = store.get_session(&SessionOptions::new(), "never-written").await;
        assert_eq!(sid, "never-written");
        assert!(data.is_empty());
        assert_eq!(cache.calls(), vec![Call::Get("rack:session:never-written".to_string())]);
        // A miss is not worth a warning
        assert!(logger.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_get_failure_is_contained() {
        let (store, cache, logger) = store_with(StoreOptions::new());
        let env = SessionOptions::new();
        store.set_session(&env, "sid-1", &sample_session()).await;
        cache.take_down();

        let (sid, data) = store.get_session(&env, "sid-1").await;
        assert_eq!(sid, "sid-1");
        assert!(data.is_empty());

        let messages = logger.messages.lock().clone();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0],
            "Session::MemcacheStore: cache unavailable: connection refused"
        );

        assert!(store.try_get_session("sid-1").await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_contained() {
        let (store, cache, logger) = store_with(StoreOptions::new());
        cache
            .inner
            .set("rack:session:sid-1", b"\x00garbage", Duration::ZERO)
            .await
            .unwrap();

        let (_, data) = store.get_session(&SessionOptions::new(), "sid-1").await;
        assert!(data.is_empty());
        assert_eq!(logger.messages.lock().len(), 1);
        assert!(logger.messages.lock()[0].contains("serialization error"));
    }

    #[tokio::test]
    async fn test_set_failure_is_contained() {
        let (store, cache, logger) = store_with(StoreOptions::new());
        cache.take_down();

        let saved = store
            .set_session(&SessionOptions::new(), "sid-1", &sample_session())
            .await;
        assert_eq!(saved, None);
        assert_eq!(logger.messages.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_ttl_propagation() {
        let (store, cache, _) = store_with(StoreOptions::new());
        let data = sample_session();

        let env = SessionOptions::new().with_expire_after(Duration::from_secs(3600));
        store.set_session(&env, "sid-1", &data).await;

        store.set_session(&SessionOptions::new(), "sid-2", &data).await;

        assert_eq!(
            cache.calls(),
            vec![
                Call::Set("rack:session:sid-1".to_string(), Duration::from_secs(3600)),
                Call::Set("rack:session:sid-2".to_string(), Duration::ZERO),
            ]
        );
    }

    #[tokio::test]
    async fn test_ttl_from_depot_env() {
        let (store, cache, _) = store_with(StoreOptions::new());
        let mut depot = Depot::new();
        depot.set_session_options(SessionOptions::new().with_expire_after(Duration::from_secs(60)));

        store.set_session(&depot, "sid-1", &sample_session()).await;
        assert_eq!(
            cache.calls(),
            vec![Call::Set("rack:session:sid-1".to_string(), Duration::from_secs(60))]
        );

        // A depot without options falls back to zero
        store.set_session(&Depot::new(), "sid-2", &sample_session()).await;
        assert_eq!(
            cache.calls()[1],
            Call::Set("rack:session:sid-2".to_string(), Duration::ZERO)
        );
    }

    #[tokio::test]
    async fn test_destroy() {
        let (store, cache, _) = store_with(StoreOptions::new());
        let env = SessionOptions::new().with_id("sid-1");
        store.set_session(&env, "sid-1", &sample_session()).await;

        assert!(store.destroy(&env).await);
        let (_, data) = store.get_session(&env, "sid-1").await;
        assert!(data.is_empty());

        // Destroying an already missing session still succeeds
        assert!(store.destroy(&env).await);
        assert!(cache
            .calls()
            .contains(&Call::Delete("rack:session:sid-1".to_string())));
    }

    #[tokio::test]
    async fn test_destroy_without_session_id_is_noop() {
        let (store, cache, logger) = store_with(StoreOptions::new());
        cache.take_down();

        assert!(store.destroy(&SessionOptions::new()).await);
        assert!(store.destroy(&Depot::new()).await);
        assert!(cache.calls().is_empty());
        assert!(logger.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_failure_is_contained() {
        let (store, cache, logger) = store_with(StoreOptions::new());
        cache.take_down();

        assert!(!store.destroy(&SessionOptions::new().with_id("sid-1")).await);
        assert_eq!(logger.messages.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_usable_as_trait_object() {
        let (store, _, _) = store_with(StoreOptions::new());
        let store: Arc<dyn SessionStore> = Arc::new(store);
        let env = SessionOptions::new().with_id("sid-1");

        assert_eq!(
            store.set_session(&env, "sid-1", &sample_session()).await.as_deref(),
            Some("sid-1")
        );
        assert_eq!(store.get_session(&env, "sid-1").await.1, sample_session());
        assert!(store.destroy(&env).await);
    }

    #[test]
    #[allow(deprecated)]
    fn test_legacy_expires_alias() {
        let (store, _, _) =
            store_with(StoreOptions::new().with_expires(Duration::from_secs(1_209_600)));

        assert_eq!(
            store.request_options().expire_after,
            Some(Duration::from_secs(1_209_600))
        );
        assert_eq!(
            store.default_options().expires_in,
            Some(Duration::from_secs(1_209_600))
        );
    }

    #[test]
    fn test_inherited_options_win() {
        let inherited = OptionLayer {
            namespace: Some(Some("base".to_string())),
            ..Default::default()
        };
        let (store, _, _) = store_with(
            StoreOptions::new()
                .with_namespace("caller")
                .with_inherited(inherited),
        );
        assert_eq!(store.session_key("abc"), "base:abc");
    }

    #[tokio::test]
    async fn test_injected_cache_is_shared() {
        let cache = MemoryCache::new();
        let store = MemcacheStore::new(StoreOptions::new().with_cache(cache.clone())).unwrap();

        store
            .set_session(&SessionOptions::new(), "sid-1", &sample_session())
            .await;
        assert!(cache.contains_key("rack:session:sid-1"));
    }

    #[cfg(feature = "memcache-cache")]
    #[test]
    fn test_default_cache_does_not_connect() {
        let store = MemcacheStore::new(StoreOptions::new().with_memcache_server("127.0.0.1:1"));
        assert!(store.is_ok());
    }

    #[cfg(feature = "memcache-cache")]
    #[test]
    fn test_memcache_config_from_resolved_options() {
        let store = MemcacheStore::new(
            StoreOptions::new()
                .with_memcache_servers(["cache-1:11211", "cache-2:11211"])
                .with_expire_after(Duration::from_secs(3600))
                .with_connect_timeout(Duration::from_millis(250))
                .with_socket_timeout(Duration::from_millis(500)),
        )
        .unwrap();

        let config = memcache_config(store.default_options()).unwrap();
        assert_eq!(config.servers, vec!["cache-1:11211".to_string(), "cache-2:11211".to_string()]);
        assert_eq!(config.expires_in, Some(Duration::from_secs(3600)));
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.timeout, Some(Duration::from_millis(500)));
    }

    #[cfg(feature = "memcache-cache")]
    #[test]
    fn test_memcache_config_keeps_client_defaults() {
        let config = memcache_config(&DefaultOptions::default()).unwrap();
        assert_eq!(config.expires_in, None);
        assert_eq!(config.timeout, None);
        assert_eq!(config.connect_timeout, crate::cache::MemcacheConfig::default().connect_timeout);
    }

    #[cfg(feature = "memcache-cache")]
    #[tokio::test]
    async fn test_unreachable_memcache_degrades_quickly() {
        let logger = RecordingLogger::default();
        let store = MemcacheStore::new(
            StoreOptions::new()
                .with_memcache_server("127.0.0.1:1")
                .with_connect_timeout(Duration::from_millis(200))
                .with_logger(logger.clone()),
        )
        .unwrap();
        let env = SessionOptions::new().with_id("sid-1");

        let started = std::time::Instant::now();
        let (sid, data) = store.get_session(&env, "sid-1").await;
        assert_eq!(sid, "sid-1");
        assert!(data.is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));

        // The server is now marked down, so writes fail without waiting
        let started = std::time::Instant::now();
        assert_eq!(store.set_session(&env, "sid-1", &sample_session()).await, None);
        assert!(!store.destroy(&env).await);
        assert!(started.elapsed() < Duration::from_millis(100));

        assert_eq!(logger.messages.lock().len(), 3);
    }

    #[cfg(feature = "memcache-cache")]
    #[test]
    fn test_empty_server_list_is_rejected() {
        let store = MemcacheStore::new(StoreOptions::new().with_memcache_servers(Vec::<String>::new()));
        assert!(matches!(store, Err(SessionError::Config(_))));
    }

    #[cfg(not(feature = "memcache-cache"))]
    #[test]
    fn test_cache_required_without_memcache_feature() {
        assert!(matches!(
            MemcacheStore::new(StoreOptions::new()),
            Err(SessionError::Config(_))
        ));
    }
}
