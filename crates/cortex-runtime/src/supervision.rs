// SPDX-License-Identifier: MIT OR Apache-2.0
//! Delegation supervision: a periodic scan for overdue delegations with
//! retry counting and escalation.
//!
//! Each tick publishes a [`SupervisionAlert`] per overdue delegation while
//! retries remain, and an [`EscalationAlert`] once they are exhausted.
//! Tick failures are logged and the loop continues; the stop signal halts
//! the timer after the in-flight tick completes.

use crate::runtime::AgentRuntime;
use cortex_bus::{MessageBus, StopSignal};
use cortex_core::{
    EscalationAlert, MessageEnvelope, MessageMeta, Payload, SupervisionAlert,
};
use cortex_tracker::{DelegationTracker, RetryCounter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Tuning knobs for the supervision service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisionConfig {
    /// Seconds between overdue scans.
    pub check_interval_secs: u64,
    /// Alerts published for a delegation before escalating.
    pub max_retries: u32,
    /// Queue reminders are published to.
    pub alert_target: String,
    /// Queue escalations are published to.
    pub escalation_target: String,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            max_retries: 3,
            alert_target: "agent.cos".to_string(),
            escalation_target: "agent.founder".to_string(),
        }
    }
}

impl SupervisionConfig {
    /// The scan interval as a [`Duration`].
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// Hosted service that watches the delegation tracker.
pub struct SupervisionService {
    bus: Arc<dyn MessageBus>,
    delegations: Arc<DelegationTracker>,
    retries: Arc<RetryCounter>,
    runtime: Option<Arc<AgentRuntime>>,
    config: SupervisionConfig,
}

impl SupervisionService {
    /// Build a service with default configuration and no runtime probe.
    #[must_use]
    pub fn new(
        bus: Arc<dyn MessageBus>,
        delegations: Arc<DelegationTracker>,
        retries: Arc<RetryCounter>,
    ) -> Self {
        Self {
            bus,
            delegations,
            retries,
            runtime: None,
            config: SupervisionConfig::default(),
        }
    }

    /// Ask the runtime whether assignees are running; without one, alerts
    /// report the agent as running.
    #[must_use]
    pub fn with_runtime(mut self, runtime: Arc<AgentRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Override the configuration.
    #[must_use]
    pub fn with_config(mut self, config: SupervisionConfig) -> Self {
        self.config = config;
        self
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &SupervisionConfig {
        &self.config
    }

    /// One supervision pass over the overdue delegations.
    ///
    /// # Errors
    ///
    /// Returns the first publish failure; earlier alerts in the same pass
    /// have already gone out.
    pub async fn tick(&self) -> anyhow::Result<()> {
        let overdue = self.delegations.overdue();
        debug!(target: "cortex.supervision", count = overdue.len(), "overdue scan");

        for record in overdue {
            let retry_count = self.retries.increment(&record.reference_code);
            let agent_running = self
                .runtime
                .as_ref()
                .map_or(true, |rt| rt.is_running(&record.delegated_to));

            if retry_count > self.config.max_retries {
                let alert = EscalationAlert {
                    meta: MessageMeta::new(),
                    reference_code: record.reference_code.clone(),
                    reason: format!("Max retries exceeded ({})", self.config.max_retries),
                    delegated_to: record.delegated_to.clone(),
                };
                let envelope = MessageEnvelope::new(
                    Payload::EscalationAlert(alert),
                    record.reference_code.clone(),
                );
                self.bus
                    .publish(envelope, &self.config.escalation_target)
                    .await?;
                warn!(
                    target: "cortex.supervision",
                    reference = %record.reference_code,
                    retry_count,
                    "delegation escalated"
                );
            } else {
                let alert = SupervisionAlert {
                    meta: MessageMeta::new(),
                    reference_code: record.reference_code.clone(),
                    delegated_to: record.delegated_to.clone(),
                    description: record.description.clone(),
                    retry_count,
                    due_at: record.due_at,
                    agent_running,
                };
                let envelope = MessageEnvelope::new(
                    Payload::SupervisionAlert(alert),
                    record.reference_code.clone(),
                );
                self.bus.publish(envelope, &self.config.alert_target).await?;
            }
        }
        Ok(())
    }

    /// Run the periodic scan until the stop signal is raised.
    ///
    /// The first scan fires after one full interval. The signal is
    /// honoured between ticks; an in-flight tick completes first.
    pub async fn run(&self, stop: StopSignal) {
        let mut interval = tokio::time::interval(self.config.check_interval());
        // interval's first tick resolves immediately; consume it so the
        // first scan happens one interval after start.
        interval.tick().await;
        loop {
            tokio::select! {
                () = stop.wait() => break,
                _ = interval.tick() => {
                    if let Err(error) = self.tick().await {
                        warn!(target: "cortex.supervision", %error, "supervision tick failed");
                    }
                }
            }
        }
        debug!(target: "cortex.supervision", "supervision stopped");
    }

    /// Spawn [`run`](Self::run) on the current tokio runtime.
    #[must_use]
    pub fn spawn(self: Arc<Self>, stop: StopSignal) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(stop).await })
    }
}
