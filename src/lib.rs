//! # salvo-memcache-session
//!
//! Memcached-backed session store for the Salvo web framework.
//!
//! The store sits between a session middleware and a cache client. It turns
//! session loads, saves and destroys into cache gets, sets and deletes under a
//! private key namespace (`rack:session:<id>` by default), so several
//! applications can share one memcached cluster.
//!
//! ## Features
//!
//! - **Namespaced keys**: `namespace:session_id`, or bare ids when namespacing is off
//! - **Expiry propagation**: the request's `expire_after` becomes the cache TTL
//! - **Failure containment**: an unreachable cache yields an empty session on
//!   load and a failure value on save/destroy, never an error for the request
//! - **Pluggable caches**: memcached (default), Redis, in-memory, or any
//!   [`CacheClient`] implementation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use salvo_core::Depot;
//! use salvo_memcache_session::{
//!     MemcacheStore, SessionDepotExt, SessionStore, StoreOptions,
//! };
//! use std::time::Duration;
//!
//! let store = MemcacheStore::new(
//!     StoreOptions::new()
//!         .with_memcache_server("localhost:11211")
//!         .with_expire_after(Duration::from_secs(14 * 24 * 3600)),
//! )?;
//!
//! // Per request, the host attaches the options and the session id it resolved
//! let mut depot = Depot::new();
//! depot.set_session_options(store.request_options().with_id(sid.clone()));
//!
//! let (sid, mut session) = store.get_session(&depot, &sid).await;
//! let views: i32 = session.get("views").unwrap_or(0);
//! session.set("views", views + 1);
//!
//! if store.set_session(&depot, &sid, &session).await.is_none() {
//!     // the write failed; the host decides whether that matters
//! }
//! ```

pub mod cache;
pub mod config;
pub mod env;
pub mod error;
pub mod logger;
pub mod session;
pub mod store;

pub use cache::{CacheClient, MemoryCache};
pub use config::{DefaultOptions, OptionLayer, SessionOptions, StoreOptions};
pub use env::SessionEnv;
pub use error::{CacheError, SessionError};
pub use logger::{SessionLogger, TracingLogger};
pub use session::SessionData;
pub use store::{MemcacheStore, SessionStore};

#[cfg(feature = "memcache-cache")]
pub use cache::{MemcacheCache, MemcacheConfig};

#[cfg(feature = "redis-cache")]
pub use cache::RedisCache;

/// Salvo's Depot as the request env
pub mod depot_ext;
pub use depot_ext::SessionDepotExt;
