//! Session metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Creation metadata and free-form properties of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Creation timestamp, UTC.
    pub created_at: DateTime<Utc>,

    /// Free-form properties.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self {
            created_at: Utc::now(),
            properties: Map::new(),
        }
    }
}

impl SessionMetadata {
    /// Set a property value.
    pub fn set_property(&mut self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), value);
    }

    /// Look up a property value.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}
