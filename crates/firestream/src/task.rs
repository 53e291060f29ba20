//! One-shot client tasks (sign-in, uploads) as streams

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::FirestreamError;
use crate::subscription::{DetachCause, Emitter, ListenerHandle, Observation, Registration};

/// Callbacks of a running task
pub trait TaskListener<T, E>: Send + Sync {
    fn on_success(&self, result: T);
    fn on_failure(&self, error: E);
    /// Intermediate state, for tasks that report progress
    fn on_progress(&self, _snapshot: T) {}
}

/// A task handle from the wrapped client
///
/// A listener added after the task finished is told the outcome right away.
pub trait Task<T, E>: Send + Sync {
    fn add_listener(&self, listener: Arc<dyn TaskListener<T, E>>) -> ListenerHandle;
    fn remove_listener(&self, handle: ListenerHandle);

    /// Ask the task to stop. Returns `false` if it cannot be cancelled or has
    /// already finished.
    fn cancel(&self) -> bool {
        false
    }
}

struct TaskForwarder<T> {
    emitter: Arc<Emitter<T>>,
}

impl<T, E> TaskListener<T, E> for TaskForwarder<T>
where
    T: Send + 'static,
    E: Into<FirestreamError> + std::fmt::Display,
{
    fn on_success(&self, result: T) {
        self.emitter.next_then_complete(result);
    }

    fn on_failure(&self, error: E) {
        warn!("Task failed: {}", error);
        self.emitter.fail(error.into());
    }

    fn on_progress(&self, snapshot: T) {
        self.emitter.next(snapshot);
    }
}

/// Bridge a task: progress and the final result are emitted, then the stream
/// completes. A failure ends the stream with an error.
///
/// With `cancel_on_unsubscribe`, unsubscribing before the task finishes also
/// cancels it.
pub(crate) fn observe_task<T, E>(
    label: &'static str,
    task: Arc<dyn Task<T, E>>,
    cancel_on_unsubscribe: bool,
) -> Observation<T>
where
    T: Send + 'static,
    E: Into<FirestreamError> + std::fmt::Display + 'static,
{
    Observation::attach(label, |emitter| {
        let handle = task.add_listener(Arc::new(TaskForwarder { emitter }));
        debug!("{}: registered task listener {}", label, handle);
        Registration::new(label, move |cause| {
            task.remove_listener(handle);
            if cancel_on_unsubscribe && cause == DetachCause::Unsubscribed && task.cancel() {
                debug!("{}: task cancelled", label);
            }
        })
    })
}
