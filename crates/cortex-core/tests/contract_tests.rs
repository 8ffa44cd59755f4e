// SPDX-License-Identifier: MIT OR Apache-2.0
//! Contract-surface tests: reference-code boundaries, envelope
//! immutability, and payload serde fidelity.

use chrono::{TimeZone, Utc};
use cortex_core::{
    AuthorityClaim, AuthorityTier, CoreError, Message, MessageEnvelope, Payload, Priority,
    ReferenceCode, ReferenceCodeGenerator,
};

fn fixed_clock() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap()
}

#[test]
fn a_day_holds_exactly_999_generated_codes() {
    let generator = ReferenceCodeGenerator::with_clock(fixed_clock);
    let first = generator.generate().unwrap();
    assert_eq!(first.as_str(), "CTX-2026-0801-001");

    let mut last = first;
    for _ in 0..998 {
        last = generator.generate().unwrap();
    }
    assert_eq!(last.as_str(), "CTX-2026-0801-999");

    let err = generator.generate().unwrap_err();
    assert!(matches!(err, CoreError::SequenceExhausted { .. }));
}

#[test]
fn boundary_strings_000_and_999_both_parse() {
    assert!("CTX-2026-0801-000".parse::<ReferenceCode>().is_ok());
    assert!("CTX-2026-0801-999".parse::<ReferenceCode>().is_ok());
}

#[test]
fn envelope_round_trips_with_full_context_and_claims() {
    let envelope = MessageEnvelope::builder(
        Payload::text("Draft reply to John"),
        "CTX-2026-0801-042".parse().unwrap(),
    )
    .claim(
        AuthorityClaim::new("founder", "cos", AuthorityTier::AskMeFirst)
            .with_actions(["email-drafting"]),
    )
    .reply_to("human")
    .from_agent("founder")
    .parent_message("m-123")
    .priority(Priority::Critical)
    .build();

    let json = serde_json::to_string_pretty(&envelope).unwrap();
    let back: MessageEnvelope = serde_json::from_str(&json).unwrap();
    assert_eq!(back, envelope);
    assert_eq!(back.message.kind(), "cortex.text");
    assert_eq!(back.message.content(), "Draft reply to John");
}

#[test]
fn functional_update_preserves_unrelated_fields() {
    let original = MessageEnvelope::builder(
        Payload::text("goal"),
        "CTX-2026-0801-001".parse().unwrap(),
    )
    .reply_to("human")
    .priority(Priority::High)
    .build();

    let updated = original
        .with_reference_code("CTX-2026-0801-002".parse().unwrap())
        .with_context(original.context.clone().with_from_agent("cos"));

    assert_eq!(updated.priority, Priority::High);
    assert_eq!(updated.context.reply_to.as_deref(), Some("human"));
    assert_eq!(updated.context.from_agent_id.as_deref(), Some("cos"));
    assert_eq!(original.reference_code.as_str(), "CTX-2026-0801-001");
    assert!(original.context.from_agent_id.is_none());
}

#[test]
fn message_ids_survive_serde() {
    let payload = Payload::text("hello");
    let id = payload.message_id().to_string();
    let back: Payload =
        serde_json::from_str(&serde_json::to_string(&payload).unwrap()).unwrap();
    assert_eq!(back.message_id(), id);
}
