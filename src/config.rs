//! Store configuration
//!
//! [`StoreOptions`] is what callers hand to [`MemcacheStore::new`](crate::MemcacheStore::new).
//! It is resolved once into an immutable [`DefaultOptions`] record, layering
//! built-in defaults, the caller's settings and any inherited base-store
//! settings in that order of precedence.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheClient;
use crate::logger::SessionLogger;

/// Namespace used when the caller does not configure one
pub const DEFAULT_NAMESPACE: &str = "rack:session";

/// Memcached server used when the caller does not configure one
pub const DEFAULT_MEMCACHE_SERVER: &str = "localhost:11211";

/// Per-request session options carried on the request env
///
/// This is the `rack.session.options` record of the host: the current session
/// id (if the host resolved one) and the expiry to apply when saving.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionOptions {
    /// Session id resolved by the host for the current request
    pub id: Option<String>,
    /// Expiry for the session entry; `None` means no explicit expiry
    pub expire_after: Option<Duration>,
}

impl SessionOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current session id
    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the expiry applied when saving
    pub fn with_expire_after(mut self, expire_after: impl Into<Option<Duration>>) -> Self {
        self.expire_after = expire_after.into();
        self
    }
}

/// One partial layer of store settings
///
/// Unset fields leave lower layers untouched. `namespace: Some(None)`
/// explicitly disables namespacing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OptionLayer {
    pub namespace: Option<Option<String>>,
    pub memcache_server: Option<Vec<String>>,
    pub expires_in: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub socket_timeout: Option<Duration>,
}

/// Resolved store settings, immutable after construction
#[derive(Clone, Debug, PartialEq)]
pub struct DefaultOptions {
    /// Key prefix; `None` leaves session ids unprefixed
    pub namespace: Option<String>,
    /// Memcached servers the default client connects to
    pub memcache_server: Vec<String>,
    /// Default expiry handed to the cache client
    pub expires_in: Option<Duration>,
    /// Bound on connecting to a cache server; `None` keeps the client default
    pub connect_timeout: Option<Duration>,
    /// Read/write timeout on cache connections; `None` keeps the client default
    pub socket_timeout: Option<Duration>,
}

impl Default for DefaultOptions {
    fn default() -> Self {
        Self {
            namespace: Some(DEFAULT_NAMESPACE.to_string()),
            memcache_server: vec![DEFAULT_MEMCACHE_SERVER.to_string()],
            expires_in: None,
            connect_timeout: None,
            socket_timeout: None,
        }
    }
}

impl DefaultOptions {
    /// Resolve settings from three layers of increasing precedence
    pub fn resolve(builtin: DefaultOptions, caller: &OptionLayer, inherited: &OptionLayer) -> Self {
        builtin.apply(caller).apply(inherited)
    }

    fn apply(mut self, layer: &OptionLayer) -> Self {
        if let Some(namespace) = &layer.namespace {
            self.namespace = namespace.clone();
        }
        if let Some(servers) = &layer.memcache_server {
            self.memcache_server = servers.clone();
        }
        if let Some(expires_in) = layer.expires_in {
            self.expires_in = Some(expires_in);
        }
        if let Some(connect_timeout) = layer.connect_timeout {
            self.connect_timeout = Some(connect_timeout);
        }
        if let Some(socket_timeout) = layer.socket_timeout {
            self.socket_timeout = Some(socket_timeout);
        }
        self
    }
}

/// Construction options for the memcache session store
#[derive(Clone, Default)]
pub struct StoreOptions {
    /// Expiry for saved sessions
    pub expire_after: Option<Duration>,

    /// Deprecated alias of `expire_after`, honored only when it is unset
    pub expires: Option<Duration>,

    /// Caller settings for namespace, servers and timeouts
    pub overrides: OptionLayer,

    /// Settings inherited from the host's base store; these win over everything
    pub inherited: OptionLayer,

    /// Pre-built cache client, used instead of connecting to `memcache_server`
    pub cache: Option<Arc<dyn CacheClient>>,

    /// Receiver for warnings about contained cache failures
    pub logger: Option<Arc<dyn SessionLogger>>,
}

impl StoreOptions {
    /// Create options with built-in defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expiry for saved sessions
    pub fn with_expire_after(mut self, expire_after: Duration) -> Self {
        self.expire_after = Some(expire_after);
        self
    }

    /// Set the expiry using the legacy `expires` name
    #[deprecated(note = "use `with_expire_after`")]
    pub fn with_expires(mut self, expires: Duration) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Set the key namespace (default: "rack:session")
    pub fn with_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.overrides.namespace = Some(Some(namespace.into()));
        self
    }

    /// Store keys as bare session ids
    pub fn without_namespace(mut self) -> Self {
        self.overrides.namespace = Some(None);
        self
    }

    /// Set a single memcached server (default: "localhost:11211")
    pub fn with_memcache_server<S: Into<String>>(mut self, server: S) -> Self {
        self.overrides.memcache_server = Some(vec![server.into()]);
        self
    }

    /// Set a list of memcached servers
    pub fn with_memcache_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.overrides.memcache_server = Some(servers.into_iter().map(|s| s.into()).collect());
        self
    }

    /// Bound how long a request may wait to connect to a cache server
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.overrides.connect_timeout = Some(timeout);
        self
    }

    /// Set the read/write timeout on cache connections
    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.overrides.socket_timeout = Some(timeout);
        self
    }

    /// Use an existing cache client
    pub fn with_cache<C: CacheClient>(self, cache: C) -> Self {
        self.with_shared_cache(Arc::new(cache))
    }

    /// Use an existing, shared cache client
    pub fn with_shared_cache(mut self, cache: Arc<dyn CacheClient>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Send warnings to a custom logger (default: tracing)
    pub fn with_logger<L: SessionLogger>(mut self, logger: L) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Set the base-store layer
    pub fn with_inherited(mut self, inherited: OptionLayer) -> Self {
        self.inherited = inherited;
        self
    }

    /// Move a legacy `expires` into `expire_after` when the latter is unset
    pub fn normalize(mut self) -> Self {
        if self.expire_after.is_none() {
            self.expire_after = self.expires.take();
        }
        self
    }

    /// The caller layer: overrides plus `expire_after` as the client's `expires_in`
    pub(crate) fn caller_layer(&self) -> OptionLayer {
        OptionLayer {
            expires_in: self.expire_after,
            ..self.overrides.clone()
        }
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("expire_after", &self.expire_after)
            .field("expires", &self.expires)
            .field("overrides", &self.overrides)
            .field("inherited", &self.inherited)
            .field("cache", &self.cache.is_some())
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_defaults() {
        let resolved = DefaultOptions::resolve(
            DefaultOptions::default(),
            &OptionLayer::default(),
            &OptionLayer::default(),
        );
        assert_eq!(resolved.namespace.as_deref(), Some("rack:session"));
        assert_eq!(resolved.memcache_server, vec!["localhost:11211".to_string()]);
        assert_eq!(resolved.expires_in, None);
    }

    #[test]
    fn test_layer_precedence() {
        let caller = OptionLayer {
            namespace: Some(Some("app".to_string())),
            memcache_server: Some(vec!["cache-1:11211".to_string()]),
            expires_in: Some(Duration::from_secs(60)),
            connect_timeout: Some(Duration::from_millis(250)),
            ..Default::default()
        };
        let inherited = OptionLayer {
            namespace: Some(Some("base".to_string())),
            ..Default::default()
        };

        let resolved = DefaultOptions::resolve(DefaultOptions::default(), &caller, &inherited);
        assert_eq!(resolved.namespace.as_deref(), Some("base"));
        assert_eq!(resolved.memcache_server, vec!["cache-1:11211".to_string()]);
        assert_eq!(resolved.expires_in, Some(Duration::from_secs(60)));
        assert_eq!(resolved.connect_timeout, Some(Duration::from_millis(250)));
        assert_eq!(resolved.socket_timeout, None);
    }

    #[test]
    fn test_timeouts_in_caller_layer() {
        let layer = StoreOptions::new()
            .with_connect_timeout(Duration::from_millis(200))
            .with_socket_timeout(Duration::from_millis(500))
            .caller_layer();
        assert_eq!(layer.connect_timeout, Some(Duration::from_millis(200)));
        assert_eq!(layer.socket_timeout, Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_namespace_can_be_disabled() {
        let caller = StoreOptions::new().without_namespace().caller_layer();
        let resolved =
            DefaultOptions::resolve(DefaultOptions::default(), &caller, &OptionLayer::default());
        assert_eq!(resolved.namespace, None);
    }

    #[test]
    #[allow(deprecated)]
    fn test_legacy_expires_alias() {
        let options = StoreOptions::new()
            .with_expires(Duration::from_secs(1_209_600))
            .normalize();
        assert_eq!(options.expire_after, Some(Duration::from_secs(1_209_600)));
        assert_eq!(options.caller_layer().expires_in, Some(Duration::from_secs(1_209_600)));
    }

    #[test]
    #[allow(deprecated)]
    fn test_expire_after_wins_over_legacy_alias() {
        let options = StoreOptions::new()
            .with_expire_after(Duration::from_secs(60))
            .with_expires(Duration::from_secs(1_209_600))
            .normalize();
        assert_eq!(options.expire_after, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_server_list() {
        let options = StoreOptions::new().with_memcache_servers(["cache-1:11211", "cache-2:11211"]);
        assert_eq!(
            options.overrides.memcache_server,
            Some(vec!["cache-1:11211".to_string(), "cache-2:11211".to_string()])
        );
    }
}
