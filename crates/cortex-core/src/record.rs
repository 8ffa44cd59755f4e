// SPDX-License-Identifier: MIT OR Apache-2.0
//! Records kept by the registries and trackers.
//!
//! Delegations and workflows are immutable; status updates produce
//! replacement values.

use crate::MessageEnvelope;
use crate::reference::ReferenceCode;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// What kind of actor sits behind an agent id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Backed by a model pipeline.
    Ai,
    /// A person reading a queue.
    Human,
    /// Not declared.
    Unknown,
}

/// A named skill an agent offers; the routing key decomposition matches on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AgentCapability {
    /// Capability name, matched case-insensitively.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Skills that implement this capability.
    pub skill_ids: Vec<String>,
}

impl AgentCapability {
    /// Build a capability with no backing skills declared.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            skill_ids: Vec::new(),
        }
    }
}

/// An agent's entry in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AgentRegistration {
    /// Registry key.
    pub agent_id: String,
    /// Display name.
    pub name: String,
    /// Actor kind.
    pub agent_type: AgentType,
    /// Capabilities offered.
    pub capabilities: Vec<AgentCapability>,
    /// When the agent first registered.
    pub registered_at: DateTime<Utc>,
    /// Whether the agent is currently consuming its queue.
    pub is_available: bool,
}

/// Lifecycle of a delegated unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    /// Handed to the assignee, not yet started.
    Assigned,
    /// The assignee reported progress.
    InProgress,
    /// Work finished, awaiting review.
    AwaitingReview,
    /// Terminal success.
    Complete,
    /// Past its deadline. The reference tracker computes this view at query
    /// time rather than storing it.
    Overdue,
}

/// One delegated unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DelegationRecord {
    /// Identity of the delegated work.
    pub reference_code: ReferenceCode,
    /// Agent that delegated.
    pub delegated_by: String,
    /// Agent the work went to.
    pub delegated_to: String,
    /// What was delegated.
    pub description: String,
    /// Current lifecycle status.
    pub status: DelegationStatus,
    /// When the delegation was created.
    pub assigned_at: DateTime<Utc>,
    /// Optional deadline.
    pub due_at: Option<DateTime<Utc>>,
    /// Set when the delegation reaches [`DelegationStatus::Complete`].
    pub completed_at: Option<DateTime<Utc>>,
}

impl DelegationRecord {
    /// Build a freshly assigned delegation.
    #[must_use]
    pub fn assigned(
        reference_code: ReferenceCode,
        delegated_by: impl Into<String>,
        delegated_to: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            reference_code,
            delegated_by: delegated_by.into(),
            delegated_to: delegated_to.into(),
            description: description.into(),
            status: DelegationStatus::Assigned,
            assigned_at: Utc::now(),
            due_at: None,
            completed_at: None,
        }
    }

    /// Set a deadline.
    #[must_use]
    pub fn due_at(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    /// Replacement record with the status updated.
    ///
    /// Reaching [`DelegationStatus::Complete`] stamps `completed_at`.
    #[must_use]
    pub fn with_status(&self, status: DelegationStatus) -> Self {
        let mut next = self.clone();
        next.status = status;
        if status == DelegationStatus::Complete && next.completed_at.is_none() {
            next.completed_at = Some(Utc::now());
        }
        next
    }
}

/// Lifecycle of a multi-task workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Sub-tasks outstanding.
    InProgress,
    /// Every sub-task result stored and the aggregate published.
    Completed,
    /// Abandoned.
    Failed,
}

/// A fan-out of sub-tasks with a parent reference code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowRecord {
    /// Parent reference code.
    pub reference_code: ReferenceCode,
    /// The envelope whose decomposition created this workflow.
    pub original_envelope: MessageEnvelope,
    /// Child reference codes, in dispatch order.
    pub subtask_reference_codes: Vec<ReferenceCode>,
    /// Decomposition summary, used as the aggregate header.
    pub summary: String,
    /// Current status.
    pub status: WorkflowStatus,
    /// When the workflow was created.
    pub created_at: DateTime<Utc>,
    /// Set when the workflow reaches a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRecord {
    /// Build an in-progress workflow.
    #[must_use]
    pub fn new(
        reference_code: ReferenceCode,
        original_envelope: MessageEnvelope,
        subtask_reference_codes: Vec<ReferenceCode>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            reference_code,
            original_envelope,
            subtask_reference_codes,
            summary: summary.into(),
            status: WorkflowStatus::InProgress,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// A unit of behaviour an agent's pipeline can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SkillDefinition {
    /// Registry key.
    pub skill_id: String,
    /// Display name.
    pub name: String,
    /// What the skill does; doubles as the prompt when `content` is absent.
    pub description: String,
    /// Grouping label.
    pub category: String,
    /// Which executor runs this skill.
    pub executor_type: String,
    /// Optional prompt or script body.
    pub content: Option<String>,
}

/// One routable sub-task produced by decomposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TaskSpec {
    /// Capability the task should be routed on.
    pub capability: String,
    /// What the assignee should do.
    pub description: String,
    /// Requested authority tier, as emitted by the skill pipeline.
    #[serde(default, alias = "authorityTier")]
    pub authority_tier: Option<String>,
}

/// The structured result of running a decomposition pipeline over a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DecompositionResult {
    /// Routable sub-tasks, in dispatch order.
    pub tasks: Vec<TaskSpec>,
    /// One-line summary of the plan.
    #[serde(default)]
    pub summary: String,
    /// Pipeline confidence in `[0.0, 1.0]`. Absent confidence parses as
    /// zero and fails every threshold.
    #[serde(default)]
    pub confidence: f64,
}

/// A decomposition parked behind the AskMeFirst gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PendingPlan {
    /// The envelope the plan was derived from.
    pub original_envelope: MessageEnvelope,
    /// The parked decomposition.
    pub decomposition: DecompositionResult,
    /// When the plan was parked.
    pub stored_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_status_replaces_rather_than_mutates() {
        let original = DelegationRecord::assigned(
            "CTX-2026-0801-001".parse().unwrap(),
            "cos",
            "email-agent",
            "Draft reply",
        );
        let updated = original.with_status(DelegationStatus::InProgress);
        assert_eq!(original.status, DelegationStatus::Assigned);
        assert_eq!(updated.status, DelegationStatus::InProgress);
        assert!(updated.completed_at.is_none());
    }

    #[test]
    fn completing_stamps_completed_at() {
        let record = DelegationRecord::assigned(
            "CTX-2026-0801-001".parse().unwrap(),
            "cos",
            "email-agent",
            "Draft reply",
        );
        let done = record.with_status(DelegationStatus::Complete);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn agent_type_serialises_snake_case() {
        assert_eq!(serde_json::to_string(&AgentType::Ai).unwrap(), "\"ai\"");
        assert_eq!(
            serde_json::to_string(&AgentType::Unknown).unwrap(),
            "\"unknown\""
        );
    }

    #[test]
    fn decomposition_serde_roundtrip() {
        let decomposition = DecompositionResult {
            tasks: vec![TaskSpec {
                capability: "email-drafting".into(),
                description: "Draft reply".into(),
                authority_tier: Some("DoItAndShowMe".into()),
            }],
            summary: "Reply to John".into(),
            confidence: 0.9,
        };
        let json = serde_json::to_string(&decomposition).unwrap();
        let back: DecompositionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, decomposition);
    }
}
