// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! cortex-runtime
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Per-agent queue binding and dispatch.
pub mod harness;
/// Process-wide agent lifecycle and team operations.
pub mod runtime;
/// Periodic overdue-delegation supervision.
pub mod supervision;

pub use harness::AgentHarness;
pub use runtime::AgentRuntime;
pub use supervision::{SupervisionConfig, SupervisionService};

use async_trait::async_trait;
use cortex_core::{AgentCapability, AgentType, MessageEnvelope};
use thiserror::Error;

/// An addressable actor that consumes messages from its inbox queue.
///
/// Implementations return `Ok(None)` when a message needs no reply; a
/// returned envelope is routed to the incoming envelope's `reply_to` by
/// the harness, which stamps identity and correlation on the way out.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable agent id; the inbox queue is `agent.<id>`.
    fn agent_id(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    /// What kind of actor this is.
    fn agent_type(&self) -> AgentType {
        AgentType::Unknown
    }

    /// Capabilities advertised in the agent registry.
    fn capabilities(&self) -> Vec<AgentCapability>;

    /// Handle one envelope, optionally producing a reply.
    ///
    /// Errors escape to the bus: the in-memory bus logs and continues, a
    /// broker-backed bus nacks to the dead-letter exchange. The harness
    /// neither catches nor retries.
    async fn process(&self, envelope: MessageEnvelope) -> anyhow::Result<Option<MessageEnvelope>>;
}

/// Errors from runtime lifecycle operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// An agent with this id is already running.
    #[error("agent already running: {agent_id}")]
    DuplicateAgent {
        /// The contested id.
        agent_id: String,
    },

    /// The bus refused the harness's consumer registration.
    #[error("bus error")]
    Bus(#[from] cortex_bus::BusError),
}
