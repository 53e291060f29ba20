//! In-memory database location

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::database::{ChildEventListener, DataSnapshot, DatabaseError, Query, ValueEventListener};
use crate::subscription::ListenerHandle;

enum Registered {
    Value(Arc<dyn ValueEventListener>),
    Child(Arc<dyn ChildEventListener>),
}

/// One queued callback, run after the lock is released
enum Delivery {
    Value(Arc<dyn ValueEventListener>, DataSnapshot),
    Added(Arc<dyn ChildEventListener>, DataSnapshot, Option<String>),
    Changed(Arc<dyn ChildEventListener>, DataSnapshot, Option<String>),
    Removed(Arc<dyn ChildEventListener>, DataSnapshot),
    Moved(Arc<dyn ChildEventListener>, DataSnapshot, Option<String>),
}

impl Delivery {
    fn run(self) {
        match self {
            Delivery::Value(l, snap) => l.on_data_change(snap),
            Delivery::Added(l, snap, prev) => l.on_child_added(snap, prev),
            Delivery::Changed(l, snap, prev) => l.on_child_changed(snap, prev),
            Delivery::Removed(l, snap) => l.on_child_removed(snap),
            Delivery::Moved(l, snap, prev) => l.on_child_moved(snap, prev),
        }
    }
}

#[derive(Default)]
struct QueryState {
    children: BTreeMap<String, Value>,
    /// Set when the location holds a scalar instead of children
    leaf: Option<Value>,
    listeners: Vec<(ListenerHandle, Registered)>,
    removed: Vec<ListenerHandle>,
}

impl QueryState {
    fn value(&self) -> Value {
        match &self.leaf {
            Some(leaf) => leaf.clone(),
            None if self.children.is_empty() => Value::Null,
            None => Value::Object(self.children.clone().into_iter().collect::<Map<_, _>>()),
        }
    }

    fn previous_key(&self, key: &str) -> Option<String> {
        self.children
            .range::<str, _>((Bound::Unbounded, Bound::Excluded(key)))
            .next_back().map(|(k, _)| k.clone())
    }

    fn child_listeners(&self) -> Vec<Arc<dyn ChildEventListener>> {
        self.listeners
            .iter()
            .filter_map(|(_, l)| match l {
                Registered::Child(l) => Some(Arc::clone(l)),
                Registered::Value(_) => None,
            })
            .collect()
    }

    fn value_deliveries(&self, key: &Option<String>) -> Vec<Delivery> {
        let snapshot = DataSnapshot::new(key.clone(), self.value());
        self.listeners
            .iter()
            .filter_map(|(_, l)| match l {
                Registered::Value(l) => Some(Delivery::Value(Arc::clone(l), snapshot.clone())),
                Registered::Child(_) => None,
            })
            .collect()
    }
}

/// A database location held in memory
///
/// Children are kept in key order. Value listeners get the current value when
/// added and after every change; child listeners get `added` for each existing
/// child when added. Child callbacks are delivered before value callbacks.
pub struct MemoryQuery {
    path: String,
    key: Option<String>,
    state: Mutex<QueryState>,
    next_id: AtomicU64,
}

impl MemoryQuery {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let key = path
            .rsplit('/')
            .find(|s| !s.is_empty())
            .map(|s| s.to_string());
        Self {
            path,
            key,
            state: Mutex::new(QueryState::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_handle(&self) -> ListenerHandle {
        ListenerHandle(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn child_snapshot(key: &str, value: &Value) -> DataSnapshot {
        DataSnapshot::new(Some(key.to_string()), value.clone())
    }

    /// Write or overwrite one child
    pub fn set_child(&self, key: &str, value: Value) {
        if value.is_null() {
            self.remove_child(key);
            return;
        }
        let deliveries = {
            let mut st = self.state.lock();
            st.leaf = None;
            let previous = st.children.insert(key.to_string(), value.clone());
            if previous.as_ref() == Some(&value) {
                return;
            }
            let is_new = previous.is_none();
            let prev_key = st.previous_key(key);
            let snap = Self::child_snapshot(key, &value);
            let mut deliveries: Vec<Delivery> = st
                .child_listeners()
                .into_iter()
                .map(|l| {
                    if is_new {
                        Delivery::Added(l, snap.clone(), prev_key.clone())
                    } else {
                        Delivery::Changed(l, snap.clone(), prev_key.clone())
                    }
                })
                .collect();
            deliveries.extend(st.value_deliveries(&self.key));
            deliveries
        };
        deliveries.into_iter().for_each(Delivery::run);
    }

    pub fn remove_child(&self, key: &str) {
        let deliveries = {
            let mut st = self.state.lock();
            let Some(old) = st.children.remove(key) else {
                return;
            };
            let snap = Self::child_snapshot(key, &old);
            let mut deliveries: Vec<Delivery> = st
                .child_listeners()
                .into_iter()
                .map(|l| Delivery::Removed(l, snap.clone()))
                .collect();
            deliveries.extend(st.value_deliveries(&self.key));
            deliveries
        };
        deliveries.into_iter().for_each(Delivery::run);
    }

    /// Report that `key` now sorts after `previous_child_key`. The data is
    /// unchanged, so only child listeners hear about it.
    pub fn move_child(&self, key: &str, previous_child_key: Option<&str>) {
        let deliveries = {
            let st = self.state.lock();
            let Some(value) = st.children.get(key) else {
                return;
            };
            let snap = Self::child_snapshot(key, value);
            st.child_listeners()
                .into_iter()
                .map(|l| {
                    Delivery::Moved(l, snap.clone(), previous_child_key.map(str::to_string))
                })
                .collect::<Vec<_>>()
        };
        deliveries.into_iter().for_each(Delivery::run);
    }

    /// Replace the whole location. Objects are diffed into child events.
    pub fn set_value(&self, value: Value) {
        let deliveries = {
            let mut st = self.state.lock();
            let old = std::mem::take(&mut st.children);
            let (children, leaf) = match value {
                Value::Object(map) => (map.into_iter().collect::<BTreeMap<_, _>>(), None),
                Value::Null => (BTreeMap::new(), None),
                other => (BTreeMap::new(), Some(other)),
            };
            st.children = children;
            st.leaf = leaf;

            let listeners = st.child_listeners();
            let mut deliveries = Vec::new();
            for (key, old_value) in &old {
                if !st.children.contains_key(key) {
                    let snap = Self::child_snapshot(key, old_value);
                    for l in &listeners {
                        deliveries.push(Delivery::Removed(Arc::clone(l), snap.clone()));
                    }
                }
            }
            for (key, new_value) in &st.children {
                let prev_key = st.previous_key(key);
                let snap = Self::child_snapshot(key, new_value);
                match old.get(key) {
                    None => listeners.iter().for_each(|l| {
                        deliveries.push(Delivery::Added(Arc::clone(l), snap.clone(), prev_key.clone()))
                    }),
                    Some(v) if v != new_value => listeners.iter().for_each(|l| {
                        deliveries.push(Delivery::Changed(Arc::clone(l), snap.clone(), prev_key.clone()))
                    }),
                    Some(_) => {}
                }
            }
            deliveries.extend(st.value_deliveries(&self.key));
            deliveries
        };
        deliveries.into_iter().for_each(Delivery::run);
    }

    /// Cancel every listener with `error` and drop them, as the service does
    /// when access is revoked
    pub fn cancel(&self, error: DatabaseError) {
        let listeners = std::mem::take(&mut self.state.lock().listeners);
        for (_, listener) in listeners {
            match listener {
                Registered::Value(l) => l.on_cancelled(error.clone()),
                Registered::Child(l) => l.on_cancelled(error.clone()),
            }
        }
    }

    pub fn snapshot(&self) -> DataSnapshot {
        DataSnapshot::new(self.key.clone(), self.state.lock().value())
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    pub fn active_handles(&self) -> Vec<ListenerHandle> {
        self.state.lock().listeners.iter().map(|(h, _)| *h).collect()
    }

    /// Every handle passed to `remove_event_listener`, in call order
    pub fn removed_handles(&self) -> Vec<ListenerHandle> {
        self.state.lock().removed.clone()
    }
}

impl Query for MemoryQuery {
    fn path(&self) -> String {
        self.path.clone()
    }

    fn add_value_event_listener(&self, listener: Arc<dyn ValueEventListener>) -> ListenerHandle {
        let handle = self.next_handle();
        let snapshot = {
            let mut st = self.state.lock();
            st.listeners.push((handle, Registered::Value(Arc::clone(&listener))));
            DataSnapshot::new(self.key.clone(), st.value())
        };
        listener.on_data_change(snapshot);
        handle
    }

    fn add_listener_for_single_value_event(
        &self,
        listener: Arc<dyn ValueEventListener>,
    ) -> ListenerHandle {
        let handle = self.next_handle();
        listener.on_data_change(self.snapshot());
        handle
    }

    fn add_child_event_listener(&self, listener: Arc<dyn ChildEventListener>) -> ListenerHandle {
        let handle = self.next_handle();
        let existing: Vec<(DataSnapshot, Option<String>)> = {
            let mut st = self.state.lock();
            st.listeners.push((handle, Registered::Child(Arc::clone(&listener))));
            let mut prev = None;
            st.children
                .iter()
                .map(|(k, v)| {
                    let item = (Self::child_snapshot(k, v), prev.take());
                    prev = Some(k.clone());
                    item
                })
                .collect()
        };
        for (snapshot, prev) in existing {
            listener.on_child_added(snapshot, prev);
        }
        handle
    }

    fn remove_event_listener(&self, handle: ListenerHandle) {
        let mut st = self.state.lock();
        st.removed.push(handle);
        st.listeners.retain(|(h, _)| *h != handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl ChildEventListener for Log {
        fn on_child_added(&self, s: DataSnapshot, prev: Option<String>) {
            self.0.lock().push(format!("added {} after {:?}", s.key().unwrap_or(""), prev));
        }
        fn on_child_changed(&self, s: DataSnapshot, _prev: Option<String>) {
            self.0.lock().push(format!("changed {}", s.key().unwrap_or("")));
        }
        fn on_child_removed(&self, s: DataSnapshot) {
            self.0.lock().push(format!("removed {}", s.key().unwrap_or("")));
        }
        fn on_child_moved(&self, s: DataSnapshot, _prev: Option<String>) {
            self.0.lock().push(format!("moved {}", s.key().unwrap_or("")));
        }
        fn on_cancelled(&self, e: DatabaseError) {
            self.0.lock().push(format!("cancelled {}", e.code));
        }
    }

    #[test]
    fn test_existing_children_replayed_in_order() {
        let q = MemoryQuery::new("list");
        q.set_child("b", json!(2));
        q.set_child("a", json!(1));

        let log = Arc::new(Log::default());
        q.add_child_event_listener(log.clone());
        assert_eq!(
            *log.0.lock(),
            vec!["added a after None", "added b after Some(\"a\")"]
        );
    }

    #[test]
    fn test_live_insert_reports_preceding_key() {
        let q = MemoryQuery::new("list");
        q.set_child("a", json!(1));
        q.set_child("c", json!(3));
        let log = Arc::new(Log::default());
        q.add_child_event_listener(log.clone());
        log.0.lock().clear();

        q.set_child("b", json!(2));
        q.set_child("0", json!(0));
        assert_eq!(
            *log.0.lock(),
            vec!["added b after Some(\"a\")", "added 0 after None"]
        );
    }

    #[test]
    fn test_set_value_diffs_children() {
        let q = MemoryQuery::new("list");
        q.set_value(json!({"a": 1, "b": 2}));
        let log = Arc::new(Log::default());
        q.add_child_event_listener(log.clone());
        log.0.lock().clear();

        q.set_value(json!({"b": 3, "c": 4}));
        assert_eq!(*log.0.lock(), vec!["removed a", "changed b", "added c after Some(\"b\")"]);
        assert_eq!(q.snapshot().value(), &json!({"b": 3, "c": 4}));
    }

    #[test]
    fn test_leaf_value_and_null() {
        let q = MemoryQuery::new("/counters/total/");
        q.set_value(json!(7));
        assert_eq!(q.snapshot().key(), Some("total"));
        assert_eq!(q.snapshot().value(), &json!(7));

        q.set_value(Value::Null);
        assert!(!q.snapshot().exists());
    }

    #[test]
    fn test_cancel_drops_listeners() {
        let q = MemoryQuery::new("x");
        let log = Arc::new(Log::default());
        q.add_child_event_listener(log.clone());
        q.cancel(DatabaseError::new(DatabaseError::PERMISSION_DENIED, "denied", ""));
        q.set_child("k", json!(true));

        assert_eq!(*log.0.lock(), vec!["cancelled -3"]);
        assert_eq!(q.listener_count(), 0);
    }
}
