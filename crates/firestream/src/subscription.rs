//! Listener lifecycle bridge
//!
//! Turns listener callbacks into a [`Stream`]. Each [`Observation`] owns one
//! [`Registration`] whose deregistration closure runs at most once, either
//! when the consumer unsubscribes (drop or [`Subscription::unsubscribe`]) or
//! when the stream reaches a terminal signal.
//!
//! Callbacks only push into an unbounded channel, so they never block the
//! client's delivery thread.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{FusedStream, Stream, StreamExt};
use futures::task::AtomicWaker;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use crate::error::FirestreamError;

/// Opaque id handed out by the wrapped client when a listener is added
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(pub u64);

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a registration was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachCause {
    /// The consumer cancelled the stream
    Unsubscribed,
    /// The stream completed or failed
    Terminated,
}

enum Signal<T> {
    Next(T),
    Completed,
    Failed(FirestreamError),
}

/// Sending half owned by a forwarding listener
///
/// The `terminated` lock is held across the check and the send, so a value
/// racing a terminal signal either lands before it or not at all.
pub(crate) struct Emitter<T> {
    tx: mpsc::UnboundedSender<Signal<T>>,
    terminated: Mutex<bool>,
    label: &'static str,
}

impl<T> Emitter<T> {
    /// Forward one value. Ignored once the stream has terminated.
    pub(crate) fn next(&self, value: T) {
        let terminated = self.terminated.lock();
        if *terminated {
            return;
        }
        // Receiver gone means the consumer already unsubscribed
        let _ = self.tx.send(Signal::Next(value));
    }

    /// Emit a final value and complete
    pub(crate) fn next_then_complete(&self, value: T) {
        let mut terminated = self.terminated.lock();
        if *terminated {
            return;
        }
        *terminated = true;
        debug!("{}: completed with value", self.label);
        let _ = self.tx.send(Signal::Next(value));
        let _ = self.tx.send(Signal::Completed);
    }

    pub(crate) fn fail(&self, error: FirestreamError) {
        let mut terminated = self.terminated.lock();
        if *terminated {
            return;
        }
        *terminated = true;
        debug!("{}: failed: {}", self.label, error);
        let _ = self.tx.send(Signal::Failed(error));
    }
}

type Detach = Box<dyn FnOnce(DetachCause) + Send>;

/// One registered listener and the closure that removes it
pub struct Registration {
    label: &'static str,
    detach: Mutex<Option<Detach>>,
    cause: Mutex<Option<DetachCause>>,
    waker: AtomicWaker,
}

impl Registration {
    pub(crate) fn new(label: &'static str, detach: impl FnOnce(DetachCause) + Send + 'static) -> Self {
        debug!("{}: listener attached", label);
        Self {
            label,
            detach: Mutex::new(Some(Box::new(detach))),
            cause: Mutex::new(None),
            waker: AtomicWaker::new(),
        }
    }

    /// A registration with nothing to remove, for streams that failed before
    /// any listener was added
    pub(crate) fn empty(label: &'static str) -> Self {
        Self {
            label,
            detach: Mutex::new(None),
            cause: Mutex::new(None),
            waker: AtomicWaker::new(),
        }
    }

    /// Run the deregistration closure and wake the consumer. Returns `false`
    /// if it already ran.
    pub fn detach(&self, cause: DetachCause) -> bool {
        let detach = self.detach.lock().take();
        match detach {
            Some(detach) => {
                *self.cause.lock() = Some(cause);
                debug!("{}: listener detached ({:?})", self.label, cause);
                detach(cause);
                self.waker.wake();
                true
            }
            None => false,
        }
    }

    pub fn is_detached(&self) -> bool {
        self.detach.lock().is_none()
    }

    /// How the registration ended, if it has
    pub fn cause(&self) -> Option<DetachCause> {
        *self.cause.lock()
    }
}

/// Consumer-side handle that can cancel an [`Observation`] from anywhere
#[derive(Clone)]
pub struct Subscription {
    registration: Arc<Registration>,
}

impl Subscription {
    /// Remove the underlying listener. Safe to call more than once.
    pub fn unsubscribe(&self) {
        self.registration.detach(DetachCause::Unsubscribed);
    }

    pub fn is_unsubscribed(&self) -> bool {
        self.registration.cause() == Some(DetachCause::Unsubscribed)
    }

    /// True once the listener is gone for any reason
    pub fn is_closed(&self) -> bool {
        self.registration.is_detached()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("label", &self.registration.label)
            .field("cause", &self.registration.cause())
            .finish()
    }
}

/// Stream of values forwarded from one client listener
///
/// Yields `Ok` per callback. A failure yields a single `Err` and ends the
/// stream. Dropping it unsubscribes.
pub struct Observation<T> {
    rx: UnboundedReceiverStream<Signal<T>>,
    registration: Arc<Registration>,
    finished: bool,
}

impl<T> Observation<T> {
    /// Open a channel and register a listener against it.
    ///
    /// `attach` receives the emitter for the forwarding listener and must
    /// return the registration that removes that listener.
    pub(crate) fn attach<F>(label: &'static str, attach: F) -> Self
    where
        F: FnOnce(Arc<Emitter<T>>) -> Registration,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = Arc::new(Emitter {
            tx,
            terminated: Mutex::new(false),
            label,
        });
        let registration = Arc::new(attach(emitter));
        Self {
            rx: UnboundedReceiverStream::new(rx),
            registration,
            finished: false,
        }
    }

    /// A stream that fails immediately without touching the client
    pub(crate) fn failed(label: &'static str, error: FirestreamError) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Signal::Failed(error));
        Self {
            rx: UnboundedReceiverStream::new(rx),
            registration: Arc::new(Registration::empty(label)),
            finished: false,
        }
    }

    /// Handle for cancelling this stream from another task
    pub fn subscription(&self) -> Subscription {
        Subscription {
            registration: Arc::clone(&self.registration),
        }
    }

    pub fn unsubscribe(&self) {
        self.registration.detach(DetachCause::Unsubscribed);
    }

    fn finish(&mut self) {
        self.finished = true;
        self.registration.detach(DetachCause::Terminated);
    }
}

// Never pin-projected; the channel receiver is heap-backed
impl<T> Unpin for Observation<T> {}

impl<T> Stream for Observation<T> {
    type Item = Result<T, FirestreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        // Registered first so an unsubscribe from another task is not missed
        self.registration.waker.register(cx.waker());
        if self.registration.cause() == Some(DetachCause::Unsubscribed) {
            self.finished = true;
            return Poll::Ready(None);
        }

        match self.rx.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Signal::Next(value))) => Poll::Ready(Some(Ok(value))),
            Poll::Ready(Some(Signal::Failed(error))) => {
                self.finish();
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(Some(Signal::Completed)) | Poll::Ready(None) => {
                self.finish();
                Poll::Ready(None)
            }
        }
    }
}

impl<T> FusedStream for Observation<T> {
    fn is_terminated(&self) -> bool {
        self.finished
    }
}

impl<T> Drop for Observation<T> {
    fn drop(&mut self) {
        self.registration.detach(DetachCause::Unsubscribed);
    }
}

impl<T> fmt::Debug for Observation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observation")
            .field("label", &self.registration.label)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn counting_observation() -> (Observation<u32>, Arc<Emitter<u32>>, Arc<AtomicUsize>) {
        let detached = Arc::new(AtomicUsize::new(0));
        let mut slot = None;
        let counter = Arc::clone(&detached);
        let observation = Observation::attach("test", |emitter| {
            slot = Some(emitter);
            Registration::new("test", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });
        let emitter = slot.expect("attach ran");
        (observation, emitter, detached)
    }

    #[tokio::test]
    async fn test_values_pass_through_in_order() {
        let (mut obs, emitter, _) = counting_observation();
        emitter.next(1);
        emitter.next(2);

        assert_eq!(obs.next().await, Some(Ok(1)));
        assert_eq!(obs.next().await, Some(Ok(2)));
        assert!(obs.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn test_failure_is_terminal_and_detaches_once() {
        let (mut obs, emitter, detached) = counting_observation();
        emitter.fail(FirestreamError::InvalidStorageUrl {
            url: "x".into(),
            reason: "y".into(),
        });
        emitter.next(7);
        emitter.next_then_complete(8);

        assert!(matches!(obs.next().await, Some(Err(_))));
        assert_eq!(obs.next().await, None);
        assert!(obs.is_terminated());
        drop(obs);
        assert_eq!(detached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_next_then_complete() {
        let (mut obs, emitter, detached) = counting_observation();
        emitter.next_then_complete(9);
        emitter.next(10);

        assert_eq!(obs.next().await, Some(Ok(9)));
        assert_eq!(obs.next().await, None);
        assert_eq!(detached.load(Ordering::SeqCst), 1);
        assert_eq!(obs.registration.cause(), Some(DetachCause::Terminated));
    }

    #[tokio::test]
    async fn test_unsubscribe_from_handle_ends_stream() {
        let (mut obs, emitter, detached) = counting_observation();
        let sub = obs.subscription();
        emitter.next(1);
        sub.unsubscribe();
        sub.unsubscribe();

        assert!(sub.is_unsubscribed());
        assert_eq!(obs.next().await, None);
        drop(obs);
        assert_eq!(detached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_detaches() {
        let (obs, _emitter, detached) = counting_observation();
        let sub = obs.subscription();
        assert!(!sub.is_closed());
        drop(obs);
        assert!(sub.is_unsubscribed());
        assert_eq!(detached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_wakes_waiting_consumer() {
        // The emitter stays alive, like a client that keeps removed listeners
        let (mut obs, _emitter, detached) = counting_observation();
        let sub = obs.subscription();
        let consumer = tokio::spawn(async move { obs.next().await });
        tokio::task::yield_now().await;

        sub.unsubscribe();
        let result = tokio::time::timeout(Duration::from_secs(2), consumer).await;
        assert!(matches!(result, Ok(Ok(None))));
        assert_eq!(detached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_value_after_final_under_contention() {
        const FINAL: u32 = u32::MAX;
        let (obs, emitter, _) = counting_observation();

        let senders: Vec<_> = (0..4)
            .map(|_| {
                let emitter = Arc::clone(&emitter);
                thread::spawn(move || {
                    for i in 0..2_000 {
                        emitter.next(i);
                    }
                })
            })
            .collect();
        thread::sleep(Duration::from_millis(1));
        emitter.next_then_complete(FINAL);
        for sender in senders {
            sender.join().unwrap();
        }

        let values: Vec<u32> = obs.map(|v| v.unwrap()).collect().await;
        assert_eq!(values.last(), Some(&FINAL));
        assert_eq!(values.iter().filter(|v| **v == FINAL).count(), 1);
    }

    #[tokio::test]
    async fn test_failed_observation_has_nothing_to_detach() {
        let mut obs: Observation<u8> = Observation::failed(
            "test",
            FirestreamError::InvalidStorageUrl {
                url: "".into(),
                reason: "empty".into(),
            },
        );
        assert!(matches!(obs.next().await, Some(Err(FirestreamError::InvalidStorageUrl { .. }))));
        assert_eq!(obs.next().await, None);
    }
}
