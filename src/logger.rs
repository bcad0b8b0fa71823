//! Warning sink for contained cache failures

/// Receives warnings the store emits when it swallows a cache failure
pub trait SessionLogger: Send + Sync + 'static {
    fn warn(&self, message: &str);
}

/// Forwards warnings to `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl SessionLogger for TracingLogger {
    fn warn(&self, message: &str) {
        tracing::warn!(target: "salvo_memcache_session", "{}", message);
    }
}
