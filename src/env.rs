//! Request context as seen by the session store

use crate::config::SessionOptions;

/// Key under which hosts keep the per-request [`SessionOptions`]
pub const SESSION_OPTIONS_KEY: &str = "rack.session.options";

/// Read access to the per-request session options of the host
pub trait SessionEnv: Send + Sync {
    /// Options for the current request, if the host attached any
    fn session_options(&self) -> Option<&SessionOptions>;

    /// Session id the host resolved for the current request
    fn current_session_id(&self) -> Option<&str> {
        self.session_options().and_then(|options| options.id.as_deref())
    }
}

impl SessionEnv for SessionOptions {
    fn session_options(&self) -> Option<&SessionOptions> {
        Some(self)
    }
}
