// SPDX-License-Identifier: MIT OR Apache-2.0
//! Message payloads.
//!
//! Every payload carries a [`MessageMeta`] (unique id, construction
//! timestamp, optional correlation id) and renders itself to text via
//! [`Message::content`] so aggregation never has to downcast to a concrete
//! type.

use crate::reference::ReferenceCode;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind tag for [`TextMessage`].
pub const KIND_TEXT: &str = "cortex.text";
/// Kind tag for [`PlanProposal`].
pub const KIND_PLAN_PROPOSAL: &str = "cortex.plan-proposal";
/// Kind tag for [`PlanApprovalResponse`].
pub const KIND_PLAN_APPROVAL: &str = "cortex.plan-approval";
/// Kind tag for [`SupervisionAlert`].
pub const KIND_SUPERVISION_ALERT: &str = "cortex.supervision-alert";
/// Kind tag for [`EscalationAlert`].
pub const KIND_ESCALATION_ALERT: &str = "cortex.escalation-alert";

/// The minimal capability set every message payload provides.
pub trait Message {
    /// Unique id of this message instance.
    fn message_id(&self) -> &str;
    /// Construction timestamp.
    fn timestamp(&self) -> DateTime<Utc>;
    /// Optional correlation id linking this message to another.
    fn correlation_id(&self) -> Option<&str>;
    /// Text rendering of the payload, used for aggregation and prompts.
    fn content(&self) -> String;
}

/// Identity and correlation fields shared by every payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MessageMeta {
    /// Unique id, assigned at construction.
    pub message_id: String,
    /// When the payload was constructed.
    pub timestamp: DateTime<Utc>,
    /// Optional id of a related message.
    pub correlation_id: Option<String>,
}

impl MessageMeta {
    /// Fresh meta with a v4 uuid and the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn correlated_with(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

impl Default for MessageMeta {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! impl_message {
    ($ty:ty, $content:expr) => {
        impl Message for $ty {
            fn message_id(&self) -> &str {
                &self.meta.message_id
            }
            fn timestamp(&self) -> DateTime<Utc> {
                self.meta.timestamp
            }
            fn correlation_id(&self) -> Option<&str> {
                self.meta.correlation_id.as_deref()
            }
            fn content(&self) -> String {
                let render: fn(&$ty) -> String = $content;
                render(self)
            }
        }
    };
}

/// Plain text payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TextMessage {
    /// Identity and correlation fields.
    #[serde(flatten)]
    pub meta: MessageMeta,
    /// The text body.
    pub text: String,
}

impl TextMessage {
    /// Build a text message with fresh meta.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            meta: MessageMeta::new(),
            text: text.into(),
        }
    }
}

impl_message!(TextMessage, |m| m.text.clone());

/// A decomposition awaiting approval, sent to the escalation target when
/// the AskMeFirst gate fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlanProposal {
    /// Identity and correlation fields.
    #[serde(flatten)]
    pub meta: MessageMeta,
    /// One-line summary of the decomposition.
    pub summary: String,
    /// Description of each planned task, in dispatch order.
    pub task_descriptions: Vec<String>,
    /// The goal text the plan was derived from.
    pub original_goal: String,
    /// Parent reference code the pending plan is stored under.
    pub workflow_reference_code: ReferenceCode,
}

impl_message!(PlanProposal, |m| {
    let mut out = format!("Plan: {}", m.summary);
    for (i, task) in m.task_descriptions.iter().enumerate() {
        out.push_str(&format!("\n  {}. {task}", i + 1));
    }
    out
});

/// Approval or rejection of a previously proposed plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlanApprovalResponse {
    /// Identity and correlation fields.
    #[serde(flatten)]
    pub meta: MessageMeta,
    /// Reference code the pending plan is stored under.
    pub workflow_reference_code: ReferenceCode,
    /// `true` to resume dispatch, `false` to abandon the plan.
    pub approved: bool,
    /// Reason supplied with a rejection.
    pub rejection_reason: Option<String>,
}

impl PlanApprovalResponse {
    /// Build an approval.
    #[must_use]
    pub fn approve(workflow_reference_code: ReferenceCode) -> Self {
        Self {
            meta: MessageMeta::new(),
            workflow_reference_code,
            approved: true,
            rejection_reason: None,
        }
    }

    /// Build a rejection carrying a reason.
    #[must_use]
    pub fn reject(workflow_reference_code: ReferenceCode, reason: impl Into<String>) -> Self {
        Self {
            meta: MessageMeta::new(),
            workflow_reference_code,
            approved: false,
            rejection_reason: Some(reason.into()),
        }
    }
}

impl_message!(PlanApprovalResponse, |m| {
    if m.approved {
        format!("Plan {} approved", m.workflow_reference_code)
    } else {
        format!(
            "Plan {} rejected: {}",
            m.workflow_reference_code,
            m.rejection_reason.as_deref().unwrap_or("no reason given")
        )
    }
});

/// Reminder that a delegation is overdue, published by the supervision
/// service while retries remain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SupervisionAlert {
    /// Identity and correlation fields.
    #[serde(flatten)]
    pub meta: MessageMeta,
    /// The overdue delegation's reference code.
    pub reference_code: ReferenceCode,
    /// Agent the delegation was assigned to.
    pub delegated_to: String,
    /// Description of the delegated work.
    pub description: String,
    /// How many times supervision has observed this delegation overdue.
    pub retry_count: u32,
    /// The deadline that was missed.
    pub due_at: Option<DateTime<Utc>>,
    /// Whether the assignee's harness was running at scan time.
    pub agent_running: bool,
}

impl_message!(SupervisionAlert, |m| format!(
    "Delegation {} to {} is overdue (retry {}): {}",
    m.reference_code, m.delegated_to, m.retry_count, m.description
));

/// Raised when an overdue delegation has exhausted its retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EscalationAlert {
    /// Identity and correlation fields.
    #[serde(flatten)]
    pub meta: MessageMeta,
    /// The delegation's reference code.
    pub reference_code: ReferenceCode,
    /// Why the escalation fired.
    pub reason: String,
    /// Agent the exhausted delegation was assigned to.
    pub delegated_to: String,
}

impl_message!(EscalationAlert, |m| format!(
    "Escalation for {}: {}",
    m.reference_code, m.reason
));

/// Application-defined payload: a kind tag plus an arbitrary JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CustomMessage {
    /// Identity and correlation fields.
    #[serde(flatten)]
    pub meta: MessageMeta,
    /// Application-declared kind tag, carried in the transport header.
    pub kind: String,
    /// Arbitrary JSON body.
    pub body: serde_json::Value,
}

impl CustomMessage {
    /// Build a custom payload.
    #[must_use]
    pub fn new(kind: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            meta: MessageMeta::new(),
            kind: kind.into(),
            body,
        }
    }
}

impl_message!(CustomMessage, |m| {
    match &m.body {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
});

/// The closed set of payloads the core understands, open to application
/// payloads through [`Payload::Custom`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "body")]
pub enum Payload {
    /// Plain text.
    #[serde(rename = "cortex.text")]
    Text(TextMessage),
    /// Decomposition awaiting approval.
    #[serde(rename = "cortex.plan-proposal")]
    PlanProposal(PlanProposal),
    /// Approval or rejection of a proposed plan.
    #[serde(rename = "cortex.plan-approval")]
    PlanApproval(PlanApprovalResponse),
    /// Overdue-delegation reminder.
    #[serde(rename = "cortex.supervision-alert")]
    SupervisionAlert(SupervisionAlert),
    /// Retries-exhausted escalation.
    #[serde(rename = "cortex.escalation-alert")]
    EscalationAlert(EscalationAlert),
    /// Application-defined payload.
    #[serde(rename = "cortex.custom")]
    Custom(CustomMessage),
}

impl Payload {
    /// Shorthand for a [`TextMessage`] payload.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextMessage::new(text))
    }

    /// The kind tag carried in the broker transport header.
    ///
    /// Custom payloads report their application-declared kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Text(_) => KIND_TEXT,
            Self::PlanProposal(_) => KIND_PLAN_PROPOSAL,
            Self::PlanApproval(_) => KIND_PLAN_APPROVAL,
            Self::SupervisionAlert(_) => KIND_SUPERVISION_ALERT,
            Self::EscalationAlert(_) => KIND_ESCALATION_ALERT,
            Self::Custom(m) => &m.kind,
        }
    }

    fn as_message(&self) -> &dyn Message {
        match self {
            Self::Text(m) => m,
            Self::PlanProposal(m) => m,
            Self::PlanApproval(m) => m,
            Self::SupervisionAlert(m) => m,
            Self::EscalationAlert(m) => m,
            Self::Custom(m) => m,
        }
    }
}

impl Message for Payload {
    fn message_id(&self) -> &str {
        self.as_message().message_id()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.as_message().timestamp()
    }

    fn correlation_id(&self) -> Option<&str> {
        self.as_message().correlation_id()
    }

    fn content(&self) -> String {
        self.as_message().content()
    }
}
