//! Salvo's Depot as the request env

use salvo_core::Depot;

use crate::config::SessionOptions;
use crate::env::{SessionEnv, SESSION_OPTIONS_KEY};

impl SessionEnv for Depot {
    fn session_options(&self) -> Option<&SessionOptions> {
        self.get::<SessionOptions>(SESSION_OPTIONS_KEY).ok()
    }
}

/// Extension trait for Salvo's Depot to attach session options to a request
pub trait SessionDepotExt {
    /// Attach options for the current request, replacing any previous ones
    fn set_session_options(&mut self, options: SessionOptions);

    /// Get the options for the current request for modification
    fn session_options_mut(&mut self) -> Option<&mut SessionOptions>;
}

impl SessionDepotExt for Depot {
    fn set_session_options(&mut self, options: SessionOptions) {
        self.insert(SESSION_OPTIONS_KEY, options);
    }

    fn session_options_mut(&mut self) -> Option<&mut SessionOptions> {
        self.get_mut::<SessionOptions>(SESSION_OPTIONS_KEY).ok()
    }
}
