// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-consumer lifecycle handles and the stop signal that backs them.
//!
//! A [`ConsumerHandle`] is a scoped resource: stopping it stops *only* the
//! consumer it was returned for. Dropping an un-stopped handle raises the
//! signal without awaiting the reader task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// Stop signal shared between a consumer handle (or hosted service) and
/// the loop it controls.
///
/// Built on a watch channel: raising the signal wakes every waiter, and a
/// loop that subscribes after the fact observes the raised state
/// immediately. All clones share one underlying channel.
#[derive(Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// A fresh, un-raised signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Raise the signal. Raising an already-raised signal is harmless.
    pub fn raise(&self) {
        self.tx.send_replace(true);
    }

    /// `true` once [`raise`](Self::raise) has been called on any clone.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the signal is raised.
    ///
    /// Completes immediately when the signal is already raised.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // wait_for covers the already-raised case; the sender half lives
        // inside self, so the channel cannot close while we hold it.
        let _ = rx.wait_for(|raised| *raised).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("raised", &self.is_raised())
            .finish()
    }
}

pub(crate) struct HandleInner {
    pub(crate) queue: String,
    pub(crate) stop: StopSignal,
    pub(crate) task: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl HandleInner {
    pub(crate) fn new(queue: String, stop: StopSignal, task: JoinHandle<()>) -> Self {
        Self {
            queue,
            stop,
            task: Mutex::new(Some(task)),
            disposed: AtomicBool::new(false),
        }
    }

    /// First caller wins; subsequent disposals are no-ops.
    pub(crate) fn begin_stop(&self) -> bool {
        self.disposed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) async fn stop(&self) {
        if !self.begin_stop() {
            return;
        }
        self.stop.raise();
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
        debug!(target: "cortex.bus", queue = %self.queue, "consumer stopped");
    }
}

/// Handle to one consumer on one queue.
///
/// Disposal is guarded by a compare-and-set, so stopping twice (or
/// stopping and then dropping) is safe.
pub struct ConsumerHandle {
    inner: Arc<HandleInner>,
}

impl ConsumerHandle {
    pub(crate) fn new(inner: Arc<HandleInner>) -> Self {
        Self { inner }
    }

    /// The queue this consumer is bound to.
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.inner.queue
    }

    /// Stop this consumer and await its reader task.
    ///
    /// In-flight handler invocations are allowed to complete.
    pub async fn stop(&self) {
        self.inner.stop().await;
    }

    /// `true` once the consumer has been stopped (or its bus was stopped).
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stop.is_raised()
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        // Non-blocking disposal: raise the signal and let the reader task
        // unwind on its own. stop() callers have already consumed the CAS.
        if self.inner.begin_stop() {
            self.inner.stop.raise();
        }
    }
}

impl std::fmt::Debug for ConsumerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerHandle")
            .field("queue", &self.inner.queue)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_starts_unraised() {
        assert!(!StopSignal::new().is_raised());
    }

    #[test]
    fn clones_observe_a_raise() {
        let a = StopSignal::new();
        let b = a.clone();
        a.raise();
        assert!(b.is_raised());
    }

    #[test]
    fn raising_twice_is_harmless() {
        let signal = StopSignal::new();
        signal.raise();
        signal.raise();
        assert!(signal.is_raised());
    }

    #[tokio::test]
    async fn wait_resolves_after_a_raise() {
        let signal = StopSignal::new();
        let waiter = signal.clone();
        let task = tokio::spawn(async move { waiter.wait().await });
        signal.raise();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn wait_resolves_immediately_when_already_raised() {
        let signal = StopSignal::new();
        signal.raise();
        signal.wait().await;
    }

    #[tokio::test]
    async fn late_subscribers_see_the_raised_state() {
        let signal = StopSignal::new();
        signal.raise();
        let late = signal.clone();
        assert!(late.is_raised());
        late.wait().await;
    }
}
