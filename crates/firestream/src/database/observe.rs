//! Database listeners as streams

use std::sync::Arc;

use tracing::{debug, warn};

use super::query::{ChildEventListener, Query, ValueEventListener};
use super::types::{ChildEvent, ChildEventType, DataSnapshot, DatabaseError};
use crate::subscription::{Emitter, Observation, Registration};

/// Forwards value callbacks into a stream
struct ValueForwarder {
    emitter: Arc<Emitter<DataSnapshot>>,
    single: bool,
}

impl ValueEventListener for ValueForwarder {
    fn on_data_change(&self, snapshot: DataSnapshot) {
        if self.single {
            self.emitter.next_then_complete(snapshot);
        } else {
            self.emitter.next(snapshot);
        }
    }

    fn on_cancelled(&self, error: DatabaseError) {
        warn!("Value listener cancelled by database: {}", error);
        self.emitter.fail(error.into());
    }
}

/// Forwards child callbacks, optionally keeping only one kind
struct ChildForwarder {
    emitter: Arc<Emitter<ChildEvent>>,
    only: Option<ChildEventType>,
}

impl ChildForwarder {
    fn forward(&self, event: ChildEvent) {
        match self.only {
            Some(kind) if kind != event.event_type => {}
            _ => self.emitter.next(event),
        }
    }
}

impl ChildEventListener for ChildForwarder {
    fn on_child_added(&self, snapshot: DataSnapshot, previous_child_key: Option<String>) {
        self.forward(ChildEvent::new(snapshot, previous_child_key, ChildEventType::Added));
    }

    fn on_child_changed(&self, snapshot: DataSnapshot, previous_child_key: Option<String>) {
        self.forward(ChildEvent::new(snapshot, previous_child_key, ChildEventType::Changed));
    }

    fn on_child_removed(&self, snapshot: DataSnapshot) {
        self.forward(ChildEvent::removed(snapshot));
    }

    fn on_child_moved(&self, snapshot: DataSnapshot, previous_child_key: Option<String>) {
        self.forward(ChildEvent::new(snapshot, previous_child_key, ChildEventType::Moved));
    }

    fn on_cancelled(&self, error: DatabaseError) {
        warn!("Child listener cancelled by database: {}", error);
        self.emitter.fail(error.into());
    }
}

fn removal<Q>(label: &'static str, query: &Arc<Q>, handle: crate::ListenerHandle) -> Registration
where
    Q: Query + ?Sized + 'static,
{
    debug!("{} on {}: registered {}", label, query.path(), handle);
    let query = Arc::clone(query);
    Registration::new(label, move |_| query.remove_event_listener(handle))
}

/// Stream every value change at `query`. Never completes on its own.
pub fn observe_value_event<Q>(query: &Arc<Q>) -> Observation<DataSnapshot>
where
    Q: Query + ?Sized + 'static,
{
    Observation::attach("value_event", |emitter| {
        let handle = query.add_value_event_listener(Arc::new(ValueForwarder {
            emitter,
            single: false,
        }));
        removal("value_event", query, handle)
    })
}

/// Read `query` once: one snapshot, then completion
pub fn observe_single_value<Q>(query: &Arc<Q>) -> Observation<DataSnapshot>
where
    Q: Query + ?Sized + 'static,
{
    Observation::attach("single_value", |emitter| {
        let handle = query.add_listener_for_single_value_event(Arc::new(ValueForwarder {
            emitter,
            single: true,
        }));
        removal("single_value", query, handle)
    })
}

fn observe_children<Q>(
    label: &'static str,
    query: &Arc<Q>,
    only: Option<ChildEventType>,
) -> Observation<ChildEvent>
where
    Q: Query + ?Sized + 'static,
{
    Observation::attach(label, |emitter| {
        let handle = query.add_child_event_listener(Arc::new(ChildForwarder { emitter, only }));
        removal(label, query, handle)
    })
}

/// Stream every child callback at `query`, tagged with its kind
pub fn observe_child_event<Q>(query: &Arc<Q>) -> Observation<ChildEvent>
where
    Q: Query + ?Sized + 'static,
{
    observe_children("child_event", query, None)
}

pub fn observe_child_added<Q>(query: &Arc<Q>) -> Observation<ChildEvent>
where
    Q: Query + ?Sized + 'static,
{
    observe_children("child_added", query, Some(ChildEventType::Added))
}

pub fn observe_child_changed<Q>(query: &Arc<Q>) -> Observation<ChildEvent>
where
    Q: Query + ?Sized + 'static,
{
    observe_children("child_changed", query, Some(ChildEventType::Changed))
}

pub fn observe_child_removed<Q>(query: &Arc<Q>) -> Observation<ChildEvent>
where
    Q: Query + ?Sized + 'static,
{
    observe_children("child_removed", query, Some(ChildEventType::Removed))
}

pub fn observe_child_moved<Q>(query: &Arc<Q>) -> Observation<ChildEvent>
where
    Q: Query + ?Sized + 'static,
{
    observe_children("child_moved", query, Some(ChildEventType::Moved))
}

/// Method-style access to the database adapters
#[derive(Debug, Clone, Copy, Default)]
pub struct RxDatabase;

impl RxDatabase {
    pub fn new() -> Self {
        Self
    }

    pub fn observe_value_event<Q: Query + ?Sized + 'static>(
        &self,
        query: &Arc<Q>,
    ) -> Observation<DataSnapshot> {
        observe_value_event(query)
    }

    pub fn observe_single_value<Q: Query + ?Sized + 'static>(
        &self,
        query: &Arc<Q>,
    ) -> Observation<DataSnapshot> {
        observe_single_value(query)
    }

    pub fn observe_child_event<Q: Query + ?Sized + 'static>(
        &self,
        query: &Arc<Q>,
    ) -> Observation<ChildEvent> {
        observe_child_event(query)
    }

    pub fn observe_child_added<Q: Query + ?Sized + 'static>(
        &self,
        query: &Arc<Q>,
    ) -> Observation<ChildEvent> {
        observe_child_added(query)
    }

    pub fn observe_child_changed<Q: Query + ?Sized + 'static>(
        &self,
        query: &Arc<Q>,
    ) -> Observation<ChildEvent> {
        observe_child_changed(query)
    }

    pub fn observe_child_removed<Q: Query + ?Sized + 'static>(
        &self,
        query: &Arc<Q>,
    ) -> Observation<ChildEvent> {
        observe_child_removed(query)
    }

    pub fn observe_child_moved<Q: Query + ?Sized + 'static>(
        &self,
        query: &Arc<Q>,
    ) -> Observation<ChildEvent> {
        observe_child_moved(query)
    }
}
