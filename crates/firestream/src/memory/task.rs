//! Task driven by hand or by an in-memory backend

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::subscription::ListenerHandle;
use crate::task::{Task, TaskListener};

type Listener<T, E> = Arc<dyn TaskListener<T, E>>;
type Starter = Box<dyn FnOnce() + Send>;
type SuccessHook<T> = Box<dyn FnOnce(&T) + Send>;

enum TaskState<T, E> {
    Pending,
    Succeeded(T),
    Failed(E),
    Canceled,
}

struct TaskInner<T, E> {
    state: TaskState<T, E>,
    listeners: Vec<(ListenerHandle, Listener<T, E>)>,
    removed: Vec<ListenerHandle>,
}

/// In-memory [`Task`]
///
/// Outcomes are set with [`succeed`](Self::succeed) / [`fail`](Self::fail);
/// only the first one counts. Listeners added after that are told the outcome
/// immediately. Callbacks run on the calling thread with no lock held.
pub struct MemoryTask<T, E> {
    inner: Mutex<TaskInner<T, E>>,
    next_id: AtomicU64,
    cancels: AtomicUsize,
    cancel_error: Option<E>,
    starter: Mutex<Option<Starter>>,
    success_hook: Mutex<Option<SuccessHook<T>>>,
}

impl<T, E> MemoryTask<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TaskInner {
                state: TaskState::Pending,
                listeners: Vec::new(),
                removed: Vec::new(),
            }),
            next_id: AtomicU64::new(1),
            cancels: AtomicUsize::new(0),
            cancel_error: None,
            starter: Mutex::new(None),
            success_hook: Mutex::new(None),
        }
    }

    /// Error reported to listeners when the task is cancelled
    pub fn with_cancel_error(mut self, error: E) -> Self {
        self.cancel_error = Some(error);
        self
    }

    /// Run `start` when the first listener is added, so that listener sees
    /// every progress step
    pub(crate) fn start_on_first_listener(&self, start: impl FnOnce() + Send + 'static) {
        *self.starter.lock() = Some(Box::new(start));
    }

    /// Run `hook` with the result when the task succeeds, before any listener
    pub(crate) fn before_success(&self, hook: impl FnOnce(&T) + Send + 'static) {
        *self.success_hook.lock() = Some(Box::new(hook));
    }

    fn snapshot_listeners(&self) -> Vec<Listener<T, E>> {
        self.inner
            .lock()
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect()
    }

    /// Report progress. Ignored once the task has finished.
    pub fn progress(&self, snapshot: T) {
        if !self.is_pending() {
            return;
        }
        for listener in self.snapshot_listeners() {
            listener.on_progress(snapshot.clone());
        }
    }

    pub fn succeed(&self, result: T) {
        let listeners = {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, TaskState::Pending) {
                return;
            }
            inner.state = TaskState::Succeeded(result.clone());
            inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect::<Vec<_>>()
        };
        let hook = self.success_hook.lock().take();
        if let Some(hook) = hook {
            hook(&result);
        }
        for listener in listeners {
            listener.on_success(result.clone());
        }
    }

    pub fn fail(&self, error: E) {
        let listeners = {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, TaskState::Pending) {
                return;
            }
            inner.state = TaskState::Failed(error.clone());
            inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect::<Vec<_>>()
        };
        for listener in listeners {
            listener.on_failure(error.clone());
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.inner.lock().state, TaskState::Pending)
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self.inner.lock().state, TaskState::Canceled)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    /// Every handle passed to `remove_listener`, in call order
    pub fn removed_handles(&self) -> Vec<ListenerHandle> {
        self.inner.lock().removed.clone()
    }

    /// Number of `cancel` calls, successful or not
    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl<T, E> Default for MemoryTask<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Task<T, E> for MemoryTask<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn add_listener(&self, listener: Arc<dyn TaskListener<T, E>>) -> ListenerHandle {
        let handle = ListenerHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let finished = {
            let mut inner = self.inner.lock();
            inner.listeners.push((handle, Arc::clone(&listener)));
            match &inner.state {
                TaskState::Pending => None,
                TaskState::Succeeded(result) => Some(Ok(result.clone())),
                TaskState::Failed(error) => Some(Err(Some(error.clone()))),
                TaskState::Canceled => Some(Err(self.cancel_error.clone())),
            }
        };

        match finished {
            Some(Ok(result)) => listener.on_success(result),
            Some(Err(Some(error))) => listener.on_failure(error),
            Some(Err(None)) => {}
            None => {
                let starter = self.starter.lock().take();
                if let Some(start) = starter {
                    start();
                }
            }
        }
        handle
    }

    fn remove_listener(&self, handle: ListenerHandle) {
        let mut inner = self.inner.lock();
        inner.removed.push(handle);
        inner.listeners.retain(|(h, _)| *h != handle);
    }

    fn cancel(&self) -> bool {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        let listeners = {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, TaskState::Pending) {
                return false;
            }
            inner.state = TaskState::Canceled;
            inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect::<Vec<_>>()
        };
        self.starter.lock().take();
        if let Some(error) = &self.cancel_error {
            for listener in listeners {
                listener.on_failure(error.clone());
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl TaskListener<u8, String> for Recorder {
        fn on_success(&self, result: u8) {
            self.events.lock().push(format!("ok {}", result));
        }
        fn on_failure(&self, error: String) {
            self.events.lock().push(format!("err {}", error));
        }
        fn on_progress(&self, snapshot: u8) {
            self.events.lock().push(format!("progress {}", snapshot));
        }
    }

    #[test]
    fn test_first_outcome_wins() {
        let task: MemoryTask<u8, String> = MemoryTask::new();
        let rec = Arc::new(Recorder::default());
        task.add_listener(rec.clone());

        task.progress(1);
        task.succeed(2);
        task.fail("late".into());
        task.progress(3);

        assert_eq!(*rec.events.lock(), vec!["progress 1", "ok 2"]);
        assert!(!task.cancel());
        assert_eq!(task.cancel_count(), 1);
    }

    #[test]
    fn test_cancel_reports_error_to_listeners() {
        let task: MemoryTask<u8, String> = MemoryTask::new().with_cancel_error("canceled".into());
        let rec = Arc::new(Recorder::default());
        task.add_listener(rec.clone());

        assert!(task.cancel());
        assert!(task.is_canceled());
        assert_eq!(*rec.events.lock(), vec!["err canceled"]);
    }

    #[test]
    fn test_starter_runs_once_for_first_listener() {
        let task: Arc<MemoryTask<u8, String>> = Arc::new(MemoryTask::new());
        let weak = Arc::downgrade(&task);
        task.start_on_first_listener(move || {
            if let Some(task) = weak.upgrade() {
                task.progress(50);
                task.succeed(100);
            }
        });

        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        task.add_listener(first.clone());
        task.add_listener(second.clone());

        assert_eq!(*first.events.lock(), vec!["progress 50", "ok 100"]);
        assert_eq!(*second.events.lock(), vec!["ok 100"]);
    }

    #[test]
    fn test_success_hook_runs_before_listeners() {
        let task: MemoryTask<u8, String> = MemoryTask::new();
        let rec = Arc::new(Recorder::default());
        task.add_listener(rec.clone());
        let seen = Arc::clone(&rec);
        task.before_success(move |result| {
            seen.events.lock().push(format!("hook {}", result));
        });

        task.succeed(4);
        task.succeed(5);
        assert_eq!(*rec.events.lock(), vec!["hook 4", "ok 4"]);
    }

    #[test]
    fn test_remove_listener_records_handle() {
        let task: MemoryTask<u8, String> = MemoryTask::new();
        let handle = task.add_listener(Arc::new(Recorder::default()));
        task.remove_listener(handle);
        task.remove_listener(handle);
        assert_eq!(task.listener_count(), 0);
        assert_eq!(task.removed_handles(), vec![handle, handle]);
    }
}
