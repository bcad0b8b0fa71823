//! Session data as seen by application code

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::SessionError;

/// Application-visible session contents
///
/// Stored in the cache as a single JSON object, one member per key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionData {
    data: HashMap<String, Value>,
}

impl SessionData {
    /// Create an empty session
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value from session data
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get the raw JSON value for a key
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Set a value in session data
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.data.insert(key.to_string(), v);
        }
    }

    /// Remove a value from session data
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Check if a key exists
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Clear all session data
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Check if session data is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of keys in the session
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Iterate over keys and raw values
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Serialize to the bytes written to the cache
    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>, SessionError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize bytes read from the cache
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, SessionError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl From<HashMap<String, Value>> for SessionData {
    fn from(data: HashMap<String, Value>) -> Self {
        Self { data }
    }
}

impl FromIterator<(String, Value)> for SessionData {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}
