//! Database payload types
//!
//! Carriers for client-provided data. Nothing here is interpreted by the
//! adapter beyond tagging child events with their kind.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Immutable copy of the data at a database location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSnapshot {
    key: Option<String>,
    value: Value,
}

impl DataSnapshot {
    pub fn new(key: Option<String>, value: Value) -> Self {
        Self { key, value }
    }

    /// Last path segment of the location, `None` at the root
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Whether the location holds any data
    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    /// Snapshot of a descendant, addressed by a slash-separated relative path.
    ///
    /// Missing locations come back as a null snapshot, matching how the
    /// database reports absent data.
    pub fn child(&self, path: &str) -> DataSnapshot {
        let mut current = &self.value;
        let mut key = self.key.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            key = Some(segment.to_string());
            current = current.get(segment).unwrap_or(&Value::Null);
        }
        DataSnapshot::new(key, current.clone())
    }

    /// Direct children in key order. Non-object values have none.
    pub fn children(&self) -> Vec<DataSnapshot> {
        let Value::Object(map) = &self.value else {
            return Vec::new();
        };
        let mut entries: Vec<_> = map.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
            .into_iter()
            .map(|(k, v)| DataSnapshot::new(Some(k.clone()), v.clone()))
            .collect()
    }

    pub fn children_count(&self) -> usize {
        self.value.as_object().map_or(0, |m| m.len())
    }

    /// Deserialize the payload into a typed value
    pub fn get<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.value)
    }
}

/// Which child callback produced a [`ChildEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildEventType {
    Added,
    Changed,
    Removed,
    Moved,
}

impl std::fmt::Display for ChildEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChildEventType::Added => write!(f, "added"),
            ChildEventType::Changed => write!(f, "changed"),
            ChildEventType::Removed => write!(f, "removed"),
            ChildEventType::Moved => write!(f, "moved"),
        }
    }
}

/// One child callback, tagged with its kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildEvent {
    pub snapshot: DataSnapshot,
    /// Key of the sibling ordered just before this child. Always `None` for
    /// removals.
    pub previous_child_key: Option<String>,
    pub event_type: ChildEventType,
}

impl ChildEvent {
    pub fn new(
        snapshot: DataSnapshot,
        previous_child_key: Option<String>,
        event_type: ChildEventType,
    ) -> Self {
        Self {
            snapshot,
            previous_child_key,
            event_type,
        }
    }

    pub fn removed(snapshot: DataSnapshot) -> Self {
        Self::new(snapshot, None, ChildEventType::Removed)
    }
}

/// Error the database reports when it cancels a listener
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct DatabaseError {
    pub code: i32,
    pub message: String,
    pub details: String,
}

impl DatabaseError {
    pub const DATA_STALE: i32 = -1;
    pub const OPERATION_FAILED: i32 = -2;
    pub const PERMISSION_DENIED: i32 = -3;
    pub const DISCONNECTED: i32 = -4;
    pub const EXPIRED_TOKEN: i32 = -6;
    pub const INVALID_TOKEN: i32 = -7;
    pub const MAX_RETRIES: i32 = -8;
    pub const OVERRIDDEN_BY_SET: i32 = -9;
    pub const UNAVAILABLE: i32 = -10;
    pub const USER_CODE_EXCEPTION: i32 = -11;
    pub const NETWORK_ERROR: i32 = -24;
    pub const WRITE_CANCELED: i32 = -25;
    pub const UNKNOWN_ERROR: i32 = -999;

    pub fn new(code: i32, message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: details.into(),
        }
    }
}
