//! Session store implementations

mod memcache_store;
mod traits;

pub use memcache_store::MemcacheStore;
pub use traits::SessionStore;
