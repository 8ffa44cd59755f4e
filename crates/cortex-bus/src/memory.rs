// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory reference implementation of [`MessageBus`].
//!
//! Each queue owns one unbounded FIFO channel. Envelopes published before
//! any consumer attaches buffer in that channel and are drained by the
//! first consumer; once consumers are attached, every publish fans out to
//! each of them. Handler failures are logged and the reader loop
//! continues — the in-memory bus implicitly acks and never dead-letters.

use crate::handle::{ConsumerHandle, HandleInner, StopSignal};
use crate::{BusError, MessageBus, MessageHandler, QueueBinding};
use async_trait::async_trait;
use cortex_core::MessageEnvelope;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct StatsInner {
    published: AtomicU64,
    delivered: AtomicU64,
    handler_failures: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of bus counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusStatsSnapshot {
    /// Envelopes accepted by [`MessageBus::publish`].
    pub published: u64,
    /// Envelopes handed to a handler.
    pub delivered: u64,
    /// Handler invocations that returned an error.
    pub handler_failures: u64,
    /// Envelopes lost to closed consumer channels.
    pub dropped: u64,
}

struct QueueState {
    backlog_tx: mpsc::UnboundedSender<MessageEnvelope>,
    backlog_rx: Option<mpsc::UnboundedReceiver<MessageEnvelope>>,
    consumers: Vec<mpsc::UnboundedSender<MessageEnvelope>>,
    depth: Arc<AtomicUsize>,
}

impl QueueState {
    fn new() -> Self {
        let (backlog_tx, backlog_rx) = mpsc::unbounded_channel();
        Self {
            backlog_tx,
            backlog_rx: Some(backlog_rx),
            consumers: Vec::new(),
            depth: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// In-memory [`MessageBus`] backed by per-queue unbounded channels.
///
/// Overload manifests as memory growth unless a depth cap is configured
/// with [`with_capacity`](Self::with_capacity), in which case publishes to
/// a full queue are rejected.
pub struct InMemoryBus {
    queues: Mutex<HashMap<String, QueueState>>,
    handles: Mutex<Vec<Weak<HandleInner>>>,
    stats: Arc<StatsInner>,
    capacity: Option<usize>,
}

impl InMemoryBus {
    /// Create a bus with unbounded queues.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            handles: Mutex::new(Vec::new()),
            stats: Arc::new(StatsInner::default()),
            capacity: None,
        }
    }

    /// Create a bus that rejects publishes once a queue holds `capacity`
    /// undelivered envelopes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// Snapshot the bus counters.
    #[must_use]
    pub fn stats(&self) -> BusStatsSnapshot {
        BusStatsSnapshot {
            published: self.stats.published.load(Ordering::Relaxed),
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            handler_failures: self.stats.handler_failures.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }

    fn spawn_reader(
        &self,
        queue_name: &str,
        handler: Arc<dyn MessageHandler>,
        mut backlog: Option<mpsc::UnboundedReceiver<MessageEnvelope>>,
        mut inbox: mpsc::UnboundedReceiver<MessageEnvelope>,
        depth: Arc<AtomicUsize>,
    ) -> Arc<HandleInner> {
        let stop = StopSignal::new();
        let reader_stop = stop.clone();
        let stats = Arc::clone(&self.stats);
        let queue = queue_name.to_string();

        let task = tokio::spawn(async move {
            if let Some(backlog) = backlog.as_mut() {
                while let Ok(envelope) = backlog.try_recv() {
                    if reader_stop.is_raised() {
                        return;
                    }
                    depth.fetch_sub(1, Ordering::SeqCst);
                    deliver(&queue, &*handler, envelope, &stats).await;
                }
            }
            loop {
                tokio::select! {
                    () = reader_stop.wait() => break,
                    received = inbox.recv() => match received {
                        Some(envelope) => {
                            depth.fetch_sub(1, Ordering::SeqCst);
                            deliver(&queue, &*handler, envelope, &stats).await;
                        }
                        None => break,
                    },
                }
            }
        });

        let inner = Arc::new(HandleInner::new(queue_name.to_string(), stop, task));
        self.handles.lock().expect("handle roster poisoned").push(Arc::downgrade(&inner));
        inner
    }
}

async fn deliver(
    queue: &str,
    handler: &dyn MessageHandler,
    envelope: MessageEnvelope,
    stats: &StatsInner,
) {
    stats.delivered.fetch_add(1, Ordering::Relaxed);
    if let Err(error) = handler.handle(envelope).await {
        stats.handler_failures.fetch_add(1, Ordering::Relaxed);
        warn!(target: "cortex.bus", %queue, %error, "handler failed; continuing");
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, envelope: MessageEnvelope, queue_name: &str) -> Result<(), BusError> {
        let mut queues = self.queues.lock().expect("queue map poisoned");
        let state = queues
            .entry(queue_name.to_string())
            .or_insert_with(QueueState::new);

        if let Some(capacity) = self.capacity
            && state.depth.load(Ordering::SeqCst) >= capacity
        {
            return Err(BusError::QueueFull {
                queue: queue_name.to_string(),
                capacity,
            });
        }

        self.stats.published.fetch_add(1, Ordering::Relaxed);
        state.consumers.retain(|tx| !tx.is_closed());

        if state.consumers.is_empty() {
            // No consumer attached: buffer in the queue's own channel,
            // recreating it if a departed consumer took the receiver.
            if state.backlog_rx.is_none() && state.backlog_tx.is_closed() {
                let (tx, rx) = mpsc::unbounded_channel();
                state.backlog_tx = tx;
                state.backlog_rx = Some(rx);
            }
            state.depth.fetch_add(1, Ordering::SeqCst);
            state
                .backlog_tx
                .send(envelope)
                .map_err(|_| BusError::PublishFailed {
                    queue: queue_name.to_string(),
                    reason: "queue channel closed".to_string(),
                })?;
        } else {
            for consumer in &state.consumers {
                state.depth.fetch_add(1, Ordering::SeqCst);
                if consumer.send(envelope.clone()).is_err() {
                    state.depth.fetch_sub(1, Ordering::SeqCst);
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        debug!(target: "cortex.bus", queue = %queue_name, "published");
        Ok(())
    }

    async fn start_consuming(
        &self,
        queue_name: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<ConsumerHandle, BusError> {
        let (backlog, inbox_rx, depth) = {
            let mut queues = self.queues.lock().expect("queue map poisoned");
            let state = queues
                .entry(queue_name.to_string())
                .or_insert_with(QueueState::new);
            let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
            state.consumers.push(inbox_tx);
            (state.backlog_rx.take(), inbox_rx, Arc::clone(&state.depth))
        };

        let inner = self.spawn_reader(queue_name, handler, backlog, inbox_rx, depth);
        debug!(target: "cortex.bus", queue = %queue_name, "consumer started");
        Ok(ConsumerHandle::new(inner))
    }

    async fn stop_all(&self) {
        let handles: Vec<Arc<HandleInner>> = {
            let mut roster = self.handles.lock().expect("handle roster poisoned");
            let strong = roster.iter().filter_map(Weak::upgrade).collect();
            roster.clear();
            strong
        };
        for handle in handles {
            handle.stop().await;
        }
    }

    fn topology(&self) -> Vec<QueueBinding> {
        let queues = self.queues.lock().expect("queue map poisoned");
        let mut bindings: Vec<QueueBinding> =
            queues.keys().map(|name| QueueBinding::for_queue(name)).collect();
        bindings.sort_by(|a, b| a.queue_name.cmp(&b.queue_name));
        bindings
    }
}
