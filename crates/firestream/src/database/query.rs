//! Listener interfaces of the wrapped database client

use std::sync::Arc;

use super::types::{DataSnapshot, DatabaseError};
use crate::subscription::ListenerHandle;

/// Receives whole-location snapshots
pub trait ValueEventListener: Send + Sync {
    fn on_data_change(&self, snapshot: DataSnapshot);
    fn on_cancelled(&self, error: DatabaseError);
}

/// Receives per-child changes under a location
pub trait ChildEventListener: Send + Sync {
    fn on_child_added(&self, snapshot: DataSnapshot, previous_child_key: Option<String>);
    fn on_child_changed(&self, snapshot: DataSnapshot, previous_child_key: Option<String>);
    fn on_child_removed(&self, snapshot: DataSnapshot);
    fn on_child_moved(&self, snapshot: DataSnapshot, previous_child_key: Option<String>);
    fn on_cancelled(&self, error: DatabaseError);
}

/// A database reference or query the client can attach listeners to
///
/// Every `add_*` call returns the handle that `remove_event_listener` takes
/// back. Removing an unknown or already removed handle is a no-op.
pub trait Query: Send + Sync {
    /// Location this query reads, for logging
    fn path(&self) -> String;

    fn add_value_event_listener(&self, listener: Arc<dyn ValueEventListener>) -> ListenerHandle;

    /// Deliver the current value once, then drop the listener
    fn add_listener_for_single_value_event(
        &self,
        listener: Arc<dyn ValueEventListener>,
    ) -> ListenerHandle;

    fn add_child_event_listener(&self, listener: Arc<dyn ChildEventListener>) -> ListenerHandle;

    fn remove_event_listener(&self, handle: ListenerHandle);
}
