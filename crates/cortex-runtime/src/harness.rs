// SPDX-License-Identifier: MIT OR Apache-2.0
//! The harness: the binding between one agent and its inbox queue.
//!
//! Start registers the agent and attaches a consumer to `agent.<id>`;
//! stop disposes only that consumer and flips the registration to
//! unavailable. Replies are stamped with the incoming envelope's
//! reference code, the incoming message id as parent, and the agent's
//! own id — whatever the agent set in those slots is overwritten.

use crate::{Agent, RuntimeError};
use async_trait::async_trait;
use chrono::Utc;
use cortex_authority::AuthorityProvider;
use cortex_bus::{ConsumerHandle, MessageBus, MessageHandler};
use cortex_core::{AgentRegistration, Message, MessageEnvelope, agent_queue};
use cortex_registry::AgentRegistry;
use cortex_telemetry::RuntimeCounters;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Binds one agent to one queue named `agent.<agent_id>`.
pub struct AgentHarness {
    agent: Arc<dyn Agent>,
    bus: Arc<dyn MessageBus>,
    registry: Arc<AgentRegistry>,
    authority: Option<Arc<AuthorityProvider>>,
    counters: Arc<RuntimeCounters>,
    handle: Mutex<Option<ConsumerHandle>>,
}

impl AgentHarness {
    /// Build a harness without authority gating.
    #[must_use]
    pub fn new(
        agent: Arc<dyn Agent>,
        bus: Arc<dyn MessageBus>,
        registry: Arc<AgentRegistry>,
    ) -> Self {
        Self {
            agent,
            bus,
            registry,
            authority: None,
            counters: Arc::new(RuntimeCounters::new()),
            handle: Mutex::new(None),
        }
    }

    /// Enable the authority gate.
    ///
    /// With a provider present, every claim carried on an inbound envelope
    /// must be unexpired and granted to this agent; envelopes carrying no
    /// claims pass. Failing envelopes are dropped silently.
    #[must_use]
    pub fn with_authority(mut self, authority: Arc<AuthorityProvider>) -> Self {
        self.authority = Some(authority);
        self
    }

    /// Share a counter set, typically the runtime-wide one, instead of
    /// this harness's private counters.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<RuntimeCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// The counters this harness increments.
    #[must_use]
    pub fn counters(&self) -> &Arc<RuntimeCounters> {
        &self.counters
    }

    /// The bound agent's id.
    #[must_use]
    pub fn agent_id(&self) -> &str {
        self.agent.agent_id()
    }

    /// Register the agent and start consuming its inbox queue.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Bus`] when the consumer cannot be attached.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        let registration = AgentRegistration {
            agent_id: self.agent.agent_id().to_string(),
            name: self.agent.name().to_string(),
            agent_type: self.agent.agent_type(),
            capabilities: self.agent.capabilities(),
            registered_at: Utc::now(),
            is_available: true,
        };
        self.registry.register(registration);

        let handler = Arc::new(HarnessHandler {
            agent: Arc::clone(&self.agent),
            bus: Arc::clone(&self.bus),
            authority: self.authority.clone(),
            counters: Arc::clone(&self.counters),
        });
        let queue = agent_queue(self.agent.agent_id());
        let handle = self.bus.start_consuming(&queue, handler).await?;
        *self.handle.lock().await = Some(handle);
        info!(target: "cortex.harness", agent = %self.agent.agent_id(), %queue, "agent started");
        Ok(())
    }

    /// Stop this agent's consumer — and only this one — then mark the
    /// registration unavailable.
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.stop().await;
        }
        self.registry.set_available(self.agent.agent_id(), false);
        info!(target: "cortex.harness", agent = %self.agent.agent_id(), "agent stopped");
    }

    /// `true` while the harness holds a live consumer handle.
    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_stopped())
    }
}

struct HarnessHandler {
    agent: Arc<dyn Agent>,
    bus: Arc<dyn MessageBus>,
    authority: Option<Arc<AuthorityProvider>>,
    counters: Arc<RuntimeCounters>,
}

#[async_trait]
impl MessageHandler for HarnessHandler {
    async fn handle(&self, envelope: MessageEnvelope) -> anyhow::Result<()> {
        let agent_id = self.agent.agent_id();

        // Claims are optional; with a provider present, any claim that is
        // expired or targeted elsewhere drops the message. No reply — the
        // silent-drop policy keeps the reply channel from leaking signal.
        if self.authority.is_some() && !envelope.authority_claims.is_empty() {
            let rejected = envelope
                .authority_claims
                .iter()
                .find(|claim| claim.is_expired() || claim.granted_to != agent_id);
            if let Some(claim) = rejected {
                warn!(
                    target: "cortex.harness",
                    agent = %agent_id,
                    granted_to = %claim.granted_to,
                    expired = claim.is_expired(),
                    "dropping envelope that failed the authority gate"
                );
                return Ok(());
            }
        }

        self.counters.message_processed();
        let Some(reply) = self.agent.process(envelope.clone()).await? else {
            return Ok(());
        };

        let Some(reply_to) = envelope.context.reply_to.clone() else {
            warn!(
                target: "cortex.harness",
                agent = %agent_id,
                "agent produced a reply but the envelope has no reply_to; dropping"
            );
            return Ok(());
        };

        let context = reply
            .context
            .clone()
            .with_parent_message(envelope.message.message_id())
            .with_from_agent(agent_id);
        let outbound = reply
            .with_reference_code(envelope.reference_code.clone())
            .with_context(context);
        self.bus.publish(outbound, &reply_to).await?;
        self.counters.reply_routed();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_bus::InMemoryBus;
    use cortex_core::{AgentCapability, AuthorityClaim, AuthorityTier, Payload, ReferenceCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    struct Echo {
        processed: Arc<AtomicUsize>,
        notify: mpsc::UnboundedSender<MessageEnvelope>,
    }

    #[async_trait]
    impl Agent for Echo {
        fn agent_id(&self) -> &str {
            "echo"
        }
        fn name(&self) -> &str {
            "Echo"
        }
        fn capabilities(&self) -> Vec<AgentCapability> {
            vec![AgentCapability::new("echoing", "repeats things")]
        }
        async fn process(
            &self,
            envelope: MessageEnvelope,
        ) -> anyhow::Result<Option<MessageEnvelope>> {
            self.processed.fetch_add(1, Ordering::SeqCst);
            let reply = envelope.with_message(Payload::text(format!(
                "echo: {}",
                envelope.message.content()
            )));
            self.notify.send(envelope).ok();
            Ok(Some(reply))
        }
    }

    fn code(n: u32) -> ReferenceCode {
        format!("CTX-2026-0801-{n:03}").parse().unwrap()
    }

    struct Fixture {
        bus: Arc<InMemoryBus>,
        registry: Arc<AgentRegistry>,
        harness: AgentHarness,
        processed: Arc<AtomicUsize>,
        seen: mpsc::UnboundedReceiver<MessageEnvelope>,
    }

    fn fixture(authority: bool) -> Fixture {
        let bus = Arc::new(InMemoryBus::new());
        let registry = Arc::new(AgentRegistry::new());
        let processed = Arc::new(AtomicUsize::new(0));
        let (tx, seen) = mpsc::unbounded_channel();
        let agent = Arc::new(Echo {
            processed: Arc::clone(&processed),
            notify: tx,
        });
        let mut harness = AgentHarness::new(
            agent,
            Arc::clone(&bus) as Arc<dyn MessageBus>,
            Arc::clone(&registry),
        );
        if authority {
            harness = harness.with_authority(Arc::new(AuthorityProvider::new()));
        }
        Fixture {
            bus,
            registry,
            harness,
            processed,
            seen,
        }
    }

    #[tokio::test]
    async fn start_registers_and_consumes_the_inbox() {
        let mut f = fixture(false);
        f.harness.start().await.unwrap();

        let registration = f.registry.get("echo").unwrap();
        assert!(registration.is_available);
        assert_eq!(registration.capabilities[0].name, "echoing");

        f.bus
            .publish(MessageEnvelope::new(Payload::text("hi"), code(1)), "agent.echo")
            .await
            .unwrap();
        timeout(Duration::from_secs(2), f.seen.recv()).await.unwrap().unwrap();
        assert_eq!(f.processed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reply_is_stamped_and_routed_to_reply_to() {
        let mut f = fixture(false);
        f.harness.start().await.unwrap();

        // Capture what lands on the reply queue.
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
        struct Capture(mpsc::UnboundedSender<MessageEnvelope>);
        #[async_trait]
        impl MessageHandler for Capture {
            async fn handle(&self, envelope: MessageEnvelope) -> anyhow::Result<()> {
                self.0.send(envelope).unwrap();
                Ok(())
            }
        }
        let _reply_handle = f
            .bus
            .start_consuming("human", Arc::new(Capture(reply_tx)))
            .await
            .unwrap();

        let inbound = MessageEnvelope::builder(Payload::text("hi"), code(1))
            .reply_to("human")
            .build();
        let inbound_id = inbound.message.message_id().to_string();
        f.bus.publish(inbound, "agent.echo").await.unwrap();

        let reply = timeout(Duration::from_secs(2), reply_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.context.from_agent_id.as_deref(), Some("echo"));
        assert_eq!(reply.context.parent_message_id.as_deref(), Some(inbound_id.as_str()));
        assert_eq!(reply.reference_code, code(1));
        assert_eq!(reply.message.content(), "echo: hi");
        f.seen.recv().await.unwrap();

        // The reply lands before the handler's bookkeeping finishes.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let counters = f.harness.counters().snapshot();
        assert_eq!(counters.messages_processed, 1);
        assert_eq!(counters.replies_routed, 1);
    }

    #[tokio::test]
    async fn reply_without_reply_to_is_dropped() {
        let mut f = fixture(false);
        f.harness.start().await.unwrap();

        f.bus
            .publish(MessageEnvelope::new(Payload::text("hi"), code(1)), "agent.echo")
            .await
            .unwrap();
        timeout(Duration::from_secs(2), f.seen.recv()).await.unwrap().unwrap();
        // Only the inbound publish is counted; the reply never went out.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.bus.stats().published, 1);
    }

    #[tokio::test]
    async fn expired_claim_drops_the_envelope_silently() {
        let mut f = fixture(true);
        f.harness.start().await.unwrap();

        let stale = AuthorityClaim::new("founder", "echo", AuthorityTier::DoItAndShowMe)
            .expiring_at(Utc::now() - chrono::Duration::hours(1));
        let envelope = MessageEnvelope::builder(Payload::text("hi"), code(1))
            .claim(stale)
            .reply_to("human")
            .build();
        f.bus.publish(envelope, "agent.echo").await.unwrap();

        assert!(
            timeout(Duration::from_millis(150), f.seen.recv()).await.is_err(),
            "process must not be invoked"
        );
        assert_eq!(f.processed.load(Ordering::SeqCst), 0);
        assert_eq!(f.bus.stats().published, 1);
        assert_eq!(f.harness.counters().snapshot().messages_processed, 0);
    }

    #[tokio::test]
    async fn mis_targeted_claim_drops_the_envelope() {
        let mut f = fixture(true);
        f.harness.start().await.unwrap();

        let foreign = AuthorityClaim::new("founder", "someone-else", AuthorityTier::JustDoIt);
        let envelope = MessageEnvelope::builder(Payload::text("hi"), code(1))
            .claim(foreign)
            .build();
        f.bus.publish(envelope, "agent.echo").await.unwrap();
        assert!(timeout(Duration::from_millis(150), f.seen.recv()).await.is_err());
    }

    #[tokio::test]
    async fn empty_claims_bypass_the_gate() {
        let mut f = fixture(true);
        f.harness.start().await.unwrap();

        f.bus
            .publish(MessageEnvelope::new(Payload::text("hi"), code(1)), "agent.echo")
            .await
            .unwrap();
        timeout(Duration::from_secs(2), f.seen.recv()).await.unwrap().unwrap();
        assert_eq!(f.processed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_flips_availability_and_stops_consuming() {
        let mut f = fixture(false);
        f.harness.start().await.unwrap();
        assert!(f.harness.is_running().await);

        f.harness.stop().await;
        assert!(!f.harness.is_running().await);
        assert!(!f.registry.get("echo").unwrap().is_available);

        f.bus
            .publish(MessageEnvelope::new(Payload::text("late"), code(2)), "agent.echo")
            .await
            .unwrap();
        assert!(timeout(Duration::from_millis(150), f.seen.recv()).await.is_err());
    }
}
