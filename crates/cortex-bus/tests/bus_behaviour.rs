// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cross-module bus behaviour: consumer lifecycle isolation, wire
//! round-trips, and redelivery dedup.

use async_trait::async_trait;
use cortex_bus::{
    DedupStore, InMemoryBus, MessageBus, MessageHandler, broker,
};
use cortex_core::{
    AuthorityClaim, AuthorityTier, Message, MessageEnvelope, Payload, PlanProposal, Priority,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

struct Capture(mpsc::UnboundedSender<MessageEnvelope>);

#[async_trait]
impl MessageHandler for Capture {
    async fn handle(&self, envelope: MessageEnvelope) -> anyhow::Result<()> {
        self.0.send(envelope).unwrap();
        Ok(())
    }
}

fn envelope(seq: u32) -> MessageEnvelope {
    MessageEnvelope::builder(
        Payload::text(format!("message {seq}")),
        format!("CTX-2026-0801-{seq:03}").parse().unwrap(),
    )
    .claim(AuthorityClaim::new("founder", "cos", AuthorityTier::DoItAndShowMe))
    .reply_to("human")
    .priority(Priority::High)
    .build()
}

#[tokio::test]
async fn dropping_a_handle_releases_only_that_consumer() {
    let bus = InMemoryBus::new();
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();

    let handle_a = bus
        .start_consuming("shared", Arc::new(Capture(tx_a)))
        .await
        .unwrap();
    let _handle_b = bus
        .start_consuming("shared", Arc::new(Capture(tx_b)))
        .await
        .unwrap();

    drop(handle_a);
    // Give the dropped consumer's reader a beat to unwind.
    tokio::time::sleep(Duration::from_millis(30)).await;

    bus.publish(envelope(1), "shared").await.unwrap();
    let received = timeout(Duration::from_secs(2), rx_b.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.message.content(), "message 1");
    assert!(timeout(Duration::from_millis(100), rx_a.recv()).await.is_err());
}

#[tokio::test]
async fn broker_frames_round_trip_typed_payloads() {
    let proposal = PlanProposal {
        meta: cortex_core::MessageMeta::new(),
        summary: "Quarterly report".into(),
        task_descriptions: vec!["Gather metrics".into()],
        original_goal: "Produce the report".into(),
        workflow_reference_code: "CTX-2026-0801-007".parse().unwrap(),
    };
    let original = MessageEnvelope::builder(
        Payload::PlanProposal(proposal),
        "CTX-2026-0801-007".parse().unwrap(),
    )
    .reply_to("agent.founder")
    .from_agent("cos")
    .build();

    let frame = broker::encode(&original).unwrap();
    assert_eq!(
        frame.headers.get(broker::HEADER_MESSAGE_TYPE).map(String::as_str),
        Some("cortex.plan-proposal")
    );

    let decoded = broker::decode(&frame, &broker::PayloadKindRegistry::new()).unwrap();
    assert_eq!(decoded, original);
    let Payload::PlanProposal(back) = decoded.message else {
        panic!("payload type lost in transit");
    };
    assert_eq!(back.summary, "Quarterly report");
}

#[tokio::test]
async fn redelivered_frames_are_caught_by_the_dedup_store() {
    let dedup = Arc::new(DedupStore::new());
    let bus = InMemoryBus::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<MessageEnvelope>();

    struct Deduping {
        dedup: Arc<DedupStore>,
        tx: mpsc::UnboundedSender<MessageEnvelope>,
    }

    #[async_trait]
    impl MessageHandler for Deduping {
        async fn handle(&self, envelope: MessageEnvelope) -> anyhow::Result<()> {
            if self.dedup.mark_seen(envelope.message.message_id()) {
                self.tx.send(envelope).unwrap();
            }
            Ok(())
        }
    }

    let _handle = bus
        .start_consuming(
            "work",
            Arc::new(Deduping {
                dedup: Arc::clone(&dedup),
                tx,
            }),
        )
        .await
        .unwrap();

    // The same envelope delivered twice, as a broker redelivery would.
    let once = envelope(1);
    bus.publish(once.clone(), "work").await.unwrap();
    bus.publish(once, "work").await.unwrap();
    bus.publish(envelope(2), "work").await.unwrap();

    let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    let second = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.message.content(), "message 1");
    assert_eq!(second.message.content(), "message 2");
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
}
