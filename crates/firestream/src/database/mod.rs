//! Realtime database adapters
//!
//! - `query` - listener traits of the wrapped client
//! - `types` - snapshots, child events, database errors
//! - `observe` - value, single-value and child streams

mod observe;
mod query;
mod types;

pub use observe::{
    observe_child_added, observe_child_changed, observe_child_event, observe_child_moved,
    observe_child_removed, observe_single_value, observe_value_event, RxDatabase,
};
pub use query::{ChildEventListener, Query, ValueEventListener};
pub use types::{ChildEvent, ChildEventType, DataSnapshot, DatabaseError};
