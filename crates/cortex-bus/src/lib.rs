// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! cortex-bus
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Broker wire contract: exchanges, routing keys, headers, codec.
pub mod broker;
/// Seen-message store for redelivery safety.
pub mod dedup;
/// Per-consumer lifecycle handles and the stop signal behind them.
pub mod handle;
/// In-memory reference implementation.
pub mod memory;

pub use dedup::DedupStore;
pub use handle::{ConsumerHandle, StopSignal};
pub use memory::{BusStatsSnapshot, InMemoryBus};

use async_trait::async_trait;
use cortex_core::{MessageEnvelope, Priority};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// A bounded queue rejected a publish.
    #[error("queue {queue:?} is full (capacity {capacity})")]
    QueueFull {
        /// Target queue.
        queue: String,
        /// Configured depth cap.
        capacity: usize,
    },

    /// The transport refused or lost a publish.
    #[error("publish to {queue:?} failed: {reason}")]
    PublishFailed {
        /// Target queue.
        queue: String,
        /// Transport-level detail.
        reason: String,
    },

    /// A transport header named a payload kind the codec cannot resolve.
    #[error("unknown payload kind: {kind:?}")]
    UnknownPayloadKind {
        /// The unresolved kind tag.
        kind: String,
    },

    /// A broker frame is missing a required slot.
    #[error("malformed broker message: {detail}")]
    MalformedFrame {
        /// What was missing or wrong.
        detail: String,
    },

    /// A broker body failed to decode as an envelope.
    #[error("envelope decode failed")]
    Decode(#[source] serde_json::Error),
}

/// Consumes envelopes delivered to one queue.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one delivery.
    ///
    /// Errors are transport-policy: the in-memory bus logs and continues,
    /// a broker-backed bus nacks to the dead-letter exchange.
    async fn handle(&self, envelope: MessageEnvelope) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into a [`MessageHandler`].
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: Fn(MessageEnvelope) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync,
{
    /// Wrap a closure returning a boxed future.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(MessageEnvelope) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync,
{
    async fn handle(&self, envelope: MessageEnvelope) -> anyhow::Result<()> {
        (self.0)(envelope).await
    }
}

/// One queue binding in the bus topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueBinding {
    /// Queue name.
    pub queue_name: String,
    /// Routing pattern the queue is bound with.
    pub routing_pattern: String,
    /// External channel association, if any.
    pub channel_id: Option<String>,
    /// Owning agent, when the queue is an agent inbox.
    pub agent_id: Option<String>,
    /// Scheduling hint recorded at bind time.
    pub priority: Priority,
}

impl QueueBinding {
    /// Binding for a queue under the canonical `queue.<name>` routing key.
    ///
    /// Agent inbox queues (`agent.<id>`) record their owning agent.
    #[must_use]
    pub fn for_queue(queue_name: &str) -> Self {
        Self {
            queue_name: queue_name.to_string(),
            routing_pattern: broker::routing_key(queue_name),
            channel_id: None,
            agent_id: queue_name
                .strip_prefix(cortex_core::AGENT_QUEUE_PREFIX)
                .map(str::to_string),
            priority: Priority::Normal,
        }
    }
}

/// The message bus: publish envelopes, attach consumers, inspect topology.
///
/// Per-consumer lifecycle is non-negotiable: the handle returned by
/// [`start_consuming`](Self::start_consuming) stops only that consumer.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Deliver an envelope to every consumer bound to `queue_name`.
    async fn publish(&self, envelope: MessageEnvelope, queue_name: &str) -> Result<(), BusError>;

    /// Attach a consumer to a queue, returning its lifecycle handle.
    async fn start_consuming(
        &self,
        queue_name: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<ConsumerHandle, BusError>;

    /// Dispose every handle created through this bus instance.
    async fn stop_all(&self);

    /// Snapshot of the current queue bindings.
    fn topology(&self) -> Vec<QueueBinding>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_records_agent_id_for_inbox_queues() {
        let binding = QueueBinding::for_queue("agent.cos");
        assert_eq!(binding.agent_id.as_deref(), Some("cos"));
        assert_eq!(binding.routing_pattern, "queue.agent.cos");
    }

    #[test]
    fn binding_leaves_agent_id_empty_for_plain_queues() {
        let binding = QueueBinding::for_queue("human");
        assert!(binding.agent_id.is_none());
        assert_eq!(binding.routing_pattern, "queue.human");
    }
}
