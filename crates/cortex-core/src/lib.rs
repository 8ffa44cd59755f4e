// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! cortex-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable contract for Cortex.
//!
//! Envelopes are immutable: every "mutation" helper returns a new value
//! with the remaining fields copied.

/// Authority tiers and claims.
pub mod authority;
/// Contract error taxonomy.
pub mod error;
/// Message payloads and the minimal message capability set.
pub mod message;
/// Records kept by registries and trackers.
pub mod record;
/// Reference codes and their generator.
pub mod reference;

pub use authority::{AuthorityClaim, AuthorityTier, WILDCARD_ACTION};
pub use error::CoreError;
pub use message::{
    CustomMessage, EscalationAlert, Message, MessageMeta, Payload, PlanApprovalResponse,
    PlanProposal, SupervisionAlert, TextMessage,
};
pub use record::{
    AgentCapability, AgentRegistration, AgentType, DecompositionResult, DelegationRecord,
    DelegationStatus, PendingPlan, SkillDefinition, TaskSpec, WorkflowRecord, WorkflowStatus,
};
pub use reference::{ReferenceCode, ReferenceCodeGenerator};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Queue name prefix for agent inboxes.
pub const AGENT_QUEUE_PREFIX: &str = "agent.";

/// Inbox queue name for the given agent id.
///
/// # Examples
///
/// ```
/// assert_eq!(cortex_core::agent_queue("cos"), "agent.cos");
/// ```
#[must_use]
pub fn agent_queue(agent_id: &str) -> String {
    format!("{AGENT_QUEUE_PREFIX}{agent_id}")
}

/// Informational scheduling hint carried on an envelope.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Lowest.
    Low,
    /// Default.
    Normal,
    /// Elevated.
    High,
    /// Highest.
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Correlation and routing context carried with an envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MessageContext {
    /// Message id of the envelope this one was produced in response to.
    pub parent_message_id: Option<String>,
    /// The goal text that started the enclosing workflow.
    pub original_goal: Option<String>,
    /// Team the conversation belongs to.
    pub team_id: Option<String>,
    /// External channel the conversation arrived on.
    pub channel_id: Option<String>,
    /// Queue replies should be published to.
    pub reply_to: Option<String>,
    /// Agent that published this envelope.
    pub from_agent_id: Option<String>,
}

impl MessageContext {
    /// Copy with `reply_to` replaced.
    #[must_use]
    pub fn with_reply_to(mut self, queue: impl Into<String>) -> Self {
        self.reply_to = Some(queue.into());
        self
    }

    /// Copy with `from_agent_id` replaced.
    #[must_use]
    pub fn with_from_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.from_agent_id = Some(agent_id.into());
        self
    }

    /// Copy with `parent_message_id` replaced.
    #[must_use]
    pub fn with_parent_message(mut self, message_id: impl Into<String>) -> Self {
        self.parent_message_id = Some(message_id.into());
        self
    }

    /// Copy with `original_goal` replaced.
    #[must_use]
    pub fn with_original_goal(mut self, goal: impl Into<String>) -> Self {
        self.original_goal = Some(goal.into());
        self
    }
}

/// The unit published on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MessageEnvelope {
    /// The payload.
    pub message: Payload,
    /// Workflow or sub-task identity.
    pub reference_code: ReferenceCode,
    /// Claims carried with this message, in grant order.
    pub authority_claims: Vec<AuthorityClaim>,
    /// Correlation and routing context.
    pub context: MessageContext,
    /// Informational scheduling hint.
    pub priority: Priority,
    /// Optional deadline for handling.
    pub sla: Option<DateTime<Utc>>,
}

impl MessageEnvelope {
    /// Build an envelope with default context and priority.
    #[must_use]
    pub fn new(message: Payload, reference_code: ReferenceCode) -> Self {
        Self {
            message,
            reference_code,
            authority_claims: Vec::new(),
            context: MessageContext::default(),
            priority: Priority::default(),
            sla: None,
        }
    }

    /// Start a builder.
    #[must_use]
    pub fn builder(message: Payload, reference_code: ReferenceCode) -> EnvelopeBuilder {
        EnvelopeBuilder::new(message, reference_code)
    }

    /// Copy with the payload replaced.
    #[must_use]
    pub fn with_message(&self, message: Payload) -> Self {
        let mut next = self.clone();
        next.message = message;
        next
    }

    /// Copy with the reference code replaced.
    #[must_use]
    pub fn with_reference_code(&self, reference_code: ReferenceCode) -> Self {
        let mut next = self.clone();
        next.reference_code = reference_code;
        next
    }

    /// Copy with the context replaced.
    #[must_use]
    pub fn with_context(&self, context: MessageContext) -> Self {
        let mut next = self.clone();
        next.context = context;
        next
    }

    /// Copy with the claims replaced.
    #[must_use]
    pub fn with_claims(&self, claims: Vec<AuthorityClaim>) -> Self {
        let mut next = self.clone();
        next.authority_claims = claims;
        next
    }

    /// The highest tier among carried claims, or [`AuthorityTier::JustDoIt`]
    /// when no claims are carried.
    #[must_use]
    pub fn max_claim_tier(&self) -> AuthorityTier {
        self.authority_claims
            .iter()
            .map(|c| c.tier)
            .max()
            .unwrap_or(AuthorityTier::JustDoIt)
    }
}

/// Fluent construction for [`MessageEnvelope`].
///
/// ```
/// use cortex_core::{MessageEnvelope, Payload};
///
/// let envelope = MessageEnvelope::builder(
///     Payload::text("Draft reply to John"),
///     "CTX-2026-0801-001".parse().unwrap(),
/// )
/// .reply_to("human")
/// .build();
/// assert_eq!(envelope.context.reply_to.as_deref(), Some("human"));
/// ```
pub struct EnvelopeBuilder {
    envelope: MessageEnvelope,
}

impl EnvelopeBuilder {
    /// Start from a payload and reference code.
    #[must_use]
    pub fn new(message: Payload, reference_code: ReferenceCode) -> Self {
        Self {
            envelope: MessageEnvelope::new(message, reference_code),
        }
    }

    /// Add one authority claim.
    #[must_use]
    pub fn claim(mut self, claim: AuthorityClaim) -> Self {
        self.envelope.authority_claims.push(claim);
        self
    }

    /// Replace the whole context.
    #[must_use]
    pub fn context(mut self, context: MessageContext) -> Self {
        self.envelope.context = context;
        self
    }

    /// Set the reply queue.
    #[must_use]
    pub fn reply_to(mut self, queue: impl Into<String>) -> Self {
        self.envelope.context.reply_to = Some(queue.into());
        self
    }

    /// Set the publishing agent.
    #[must_use]
    pub fn from_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.envelope.context.from_agent_id = Some(agent_id.into());
        self
    }

    /// Set the parent message id.
    #[must_use]
    pub fn parent_message(mut self, message_id: impl Into<String>) -> Self {
        self.envelope.context.parent_message_id = Some(message_id.into());
        self
    }

    /// Set the priority hint.
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.envelope.priority = priority;
        self
    }

    /// Set the handling deadline.
    #[must_use]
    pub fn sla(mut self, deadline: DateTime<Utc>) -> Self {
        self.envelope.sla = Some(deadline);
        self
    }

    /// Finish.
    #[must_use]
    pub fn build(self) -> MessageEnvelope {
        self.envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(n: u32) -> ReferenceCode {
        format!("CTX-2026-0801-{n:03}").parse().unwrap()
    }

    #[test]
    fn agent_queue_prefixes_the_id() {
        assert_eq!(agent_queue("email-agent"), "agent.email-agent");
    }

    #[test]
    fn priority_orders_low_to_critical() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::High < Priority::Critical);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn with_helpers_do_not_mutate_the_original() {
        let envelope = MessageEnvelope::new(Payload::text("goal"), code(1));
        let rerouted = envelope.with_context(envelope.context.clone().with_reply_to("human"));
        assert!(envelope.context.reply_to.is_none());
        assert_eq!(rerouted.context.reply_to.as_deref(), Some("human"));
        assert_eq!(rerouted.reference_code, envelope.reference_code);
    }

    #[test]
    fn max_claim_tier_defaults_to_just_do_it() {
        let envelope = MessageEnvelope::new(Payload::text("goal"), code(1));
        assert_eq!(envelope.max_claim_tier(), AuthorityTier::JustDoIt);
    }

    #[test]
    fn max_claim_tier_takes_the_highest() {
        let envelope = MessageEnvelope::builder(Payload::text("goal"), code(1))
            .claim(AuthorityClaim::new("founder", "cos", AuthorityTier::JustDoIt))
            .claim(AuthorityClaim::new("founder", "cos", AuthorityTier::AskMeFirst))
            .build();
        assert_eq!(envelope.max_claim_tier(), AuthorityTier::AskMeFirst);
    }

    #[test]
    fn envelope_serde_roundtrips_every_field() {
        let envelope = MessageEnvelope::builder(Payload::text("goal"), code(7))
            .claim(AuthorityClaim::new("founder", "cos", AuthorityTier::DoItAndShowMe))
            .reply_to("human")
            .from_agent("founder")
            .priority(Priority::High)
            .sla(Utc::now())
            .build();
        let json = serde_json::to_string(&envelope).unwrap();
        let back: MessageEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, envelope);
    }
}
