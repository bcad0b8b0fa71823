//! Session store trait

use async_trait::async_trait;

use crate::env::SessionEnv;
use crate::session::SessionData;

/// Store contract expected by a session middleware host
///
/// None of these calls fail: stores contain their backend errors and report
/// them through return values only.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Load the session for `sid`
    ///
    /// Returns the same id with the stored data, or with empty data when
    /// nothing could be loaded.
    async fn get_session(&self, env: &dyn SessionEnv, sid: &str) -> (String, SessionData);

    /// Persist the session for `sid`
    ///
    /// Returns the id on success and `None` when the write failed.
    async fn set_session(
        &self,
        env: &dyn SessionEnv,
        sid: &str,
        session: &SessionData,
    ) -> Option<String>;

    /// Remove the session of the current request
    ///
    /// Returns `false` only when removal was attempted and failed.
    async fn destroy(&self, env: &dyn SessionEnv) -> bool;
}
