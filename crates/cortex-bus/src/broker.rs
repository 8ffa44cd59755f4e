// SPDX-License-Identifier: MIT OR Apache-2.0
//! Broker wire contract.
//!
//! The broker-backed bus is an external collaborator; this module pins the
//! contract it must honour: exchange and queue declarations, routing keys,
//! the payload type header, and the envelope codec. Handler success acks;
//! handler failure nacks to the dead-letter exchange without in-bus retry.

use crate::BusError;
use cortex_core::{MessageEnvelope, message};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Durable topic exchange every Cortex message is published to.
pub const EXCHANGE_MESSAGES: &str = "cortex.messages";
/// Durable fanout exchange failures are sunk to.
pub const EXCHANGE_DEAD_LETTER: &str = "cortex.deadletter";
/// Transport header carrying the payload kind tag.
pub const HEADER_MESSAGE_TYPE: &str = "cortex-message-type";
/// Body content type.
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// Persistent delivery mode, in AMQP terms.
pub const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Routing key for a queue on the topic exchange.
#[must_use]
pub fn routing_key(queue_name: &str) -> String {
    format!("queue.{queue_name}")
}

/// Declaration options for one Cortex queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDeclaration {
    /// Queue name.
    pub name: String,
    /// Routing key binding the queue to [`EXCHANGE_MESSAGES`].
    pub routing_key: String,
    /// Queues survive broker restarts.
    pub durable: bool,
    /// Queues are shared, not connection-scoped.
    pub exclusive: bool,
    /// Queues persist without consumers.
    pub auto_delete: bool,
    /// Failures route here.
    pub dead_letter_exchange: String,
}

impl QueueDeclaration {
    /// Canonical declaration for a Cortex queue.
    #[must_use]
    pub fn for_queue(queue_name: &str) -> Self {
        Self {
            name: queue_name.to_string(),
            routing_key: routing_key(queue_name),
            durable: true,
            exclusive: false,
            auto_delete: false,
            dead_letter_exchange: EXCHANGE_DEAD_LETTER.to_string(),
        }
    }
}

/// Everything a broker client must declare before the bus can operate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyPlan {
    /// `(name, kind)` exchange declarations, all durable.
    pub exchanges: Vec<(String, String)>,
    /// Queue declarations with their bindings.
    pub queues: Vec<QueueDeclaration>,
}

/// Build the declaration plan for a set of queues.
#[must_use]
pub fn topology_plan<'a, I: IntoIterator<Item = &'a str>>(queue_names: I) -> TopologyPlan {
    TopologyPlan {
        exchanges: vec![
            (EXCHANGE_MESSAGES.to_string(), "topic".to_string()),
            (EXCHANGE_DEAD_LETTER.to_string(), "fanout".to_string()),
        ],
        queues: queue_names
            .into_iter()
            .map(QueueDeclaration::for_queue)
            .collect(),
    }
}

/// One frame as it travels through the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Transport headers; always includes [`HEADER_MESSAGE_TYPE`].
    pub headers: BTreeMap<String, String>,
    /// Always [`CONTENT_TYPE_JSON`].
    pub content_type: String,
    /// Always [`DELIVERY_MODE_PERSISTENT`].
    pub delivery_mode: u8,
    /// JSON-encoded [`MessageEnvelope`].
    pub body: Vec<u8>,
}

/// Resolves payload kind tags during decode.
///
/// The five core kinds are always known; applications register the kind
/// tags of their custom payloads. An unregistered tag fails resolution and
/// the caller nacks the frame to the dead-letter exchange.
#[derive(Debug, Clone, Default)]
pub struct PayloadKindRegistry {
    custom: BTreeSet<String>,
}

impl PayloadKindRegistry {
    /// Registry knowing only the core kinds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a custom payload kind during decode.
    pub fn register_custom(&mut self, kind: impl Into<String>) {
        self.custom.insert(kind.into());
    }

    /// `true` when the kind resolves to a decodable payload type.
    #[must_use]
    pub fn resolves(&self, kind: &str) -> bool {
        matches!(
            kind,
            message::KIND_TEXT
                | message::KIND_PLAN_PROPOSAL
                | message::KIND_PLAN_APPROVAL
                | message::KIND_SUPERVISION_ALERT
                | message::KIND_ESCALATION_ALERT
        ) || self.custom.contains(kind)
    }
}

/// Encode an envelope for publication.
///
/// # Errors
///
/// Returns [`BusError::Decode`] if the envelope fails to serialise, which
/// indicates a bug in a payload type rather than a transport fault.
pub fn encode(envelope: &MessageEnvelope) -> Result<BrokerMessage, BusError> {
    let body = serde_json::to_vec(envelope).map_err(BusError::Decode)?;
    let mut headers = BTreeMap::new();
    headers.insert(
        HEADER_MESSAGE_TYPE.to_string(),
        envelope.message.kind().to_string(),
    );
    Ok(BrokerMessage {
        headers,
        content_type: CONTENT_TYPE_JSON.to_string(),
        delivery_mode: DELIVERY_MODE_PERSISTENT,
        body,
    })
}

/// Decode a frame back into an envelope.
///
/// Resolution reads [`HEADER_MESSAGE_TYPE`] first; only a resolvable kind
/// proceeds to body decode.
///
/// # Errors
///
/// [`BusError::MalformedFrame`] when the header is missing,
/// [`BusError::UnknownPayloadKind`] when the kind does not resolve, and
/// [`BusError::Decode`] when the body is not a valid envelope.
pub fn decode(
    frame: &BrokerMessage,
    registry: &PayloadKindRegistry,
) -> Result<MessageEnvelope, BusError> {
    let kind = frame
        .headers
        .get(HEADER_MESSAGE_TYPE)
        .ok_or_else(|| BusError::MalformedFrame {
            detail: format!("missing {HEADER_MESSAGE_TYPE} header"),
        })?;
    if !registry.resolves(kind) {
        return Err(BusError::UnknownPayloadKind { kind: kind.clone() });
    }
    let envelope: MessageEnvelope = serde_json::from_slice(&frame.body).map_err(BusError::Decode)?;
    if envelope.message.kind() != kind {
        return Err(BusError::MalformedFrame {
            detail: format!(
                "header kind {kind:?} does not match body kind {:?}",
                envelope.message.kind()
            ),
        });
    }
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::{CustomMessage, Payload};

    fn envelope() -> MessageEnvelope {
        MessageEnvelope::builder(
            Payload::text("Draft reply to John"),
            "CTX-2026-0801-001".parse().unwrap(),
        )
        .reply_to("human")
        .from_agent("founder")
        .build()
    }

    #[test]
    fn routing_key_prefixes_queue() {
        assert_eq!(routing_key("agent.cos"), "queue.agent.cos");
    }

    #[test]
    fn queue_declaration_matches_contract() {
        let decl = QueueDeclaration::for_queue("agent.cos");
        assert!(decl.durable);
        assert!(!decl.exclusive);
        assert!(!decl.auto_delete);
        assert_eq!(decl.dead_letter_exchange, "cortex.deadletter");
        assert_eq!(decl.routing_key, "queue.agent.cos");
    }

    #[test]
    fn topology_plan_declares_both_exchanges() {
        let plan = topology_plan(["agent.cos", "human"]);
        assert_eq!(plan.exchanges.len(), 2);
        assert_eq!(plan.exchanges[0].1, "topic");
        assert_eq!(plan.exchanges[1].1, "fanout");
        assert_eq!(plan.queues.len(), 2);
    }

    #[test]
    fn encode_sets_type_header_and_persistent_mode() {
        let frame = encode(&envelope()).unwrap();
        assert_eq!(
            frame.headers.get(HEADER_MESSAGE_TYPE).map(String::as_str),
            Some("cortex.text")
        );
        assert_eq!(frame.content_type, "application/json");
        assert_eq!(frame.delivery_mode, DELIVERY_MODE_PERSISTENT);
    }

    #[test]
    fn roundtrip_preserves_every_field() {
        let original = envelope();
        let frame = encode(&original).unwrap();
        let back = decode(&frame, &PayloadKindRegistry::new()).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn unknown_kind_fails_resolution() {
        let custom = MessageEnvelope::new(
            Payload::Custom(CustomMessage::new("app.invoice", serde_json::json!({}))),
            "CTX-2026-0801-002".parse().unwrap(),
        );
        let frame = encode(&custom).unwrap();
        let err = decode(&frame, &PayloadKindRegistry::new()).unwrap_err();
        assert!(matches!(err, BusError::UnknownPayloadKind { .. }));
    }

    #[test]
    fn registered_custom_kind_resolves() {
        let custom = MessageEnvelope::new(
            Payload::Custom(CustomMessage::new(
                "app.invoice",
                serde_json::json!({"amount": 12}),
            )),
            "CTX-2026-0801-002".parse().unwrap(),
        );
        let frame = encode(&custom).unwrap();
        let mut registry = PayloadKindRegistry::new();
        registry.register_custom("app.invoice");
        let back = decode(&frame, &registry).unwrap();
        assert_eq!(back, custom);
    }

    #[test]
    fn missing_header_is_malformed() {
        let mut frame = encode(&envelope()).unwrap();
        frame.headers.clear();
        let err = decode(&frame, &PayloadKindRegistry::new()).unwrap_err();
        assert!(matches!(err, BusError::MalformedFrame { .. }));
    }
}
