// SPDX-License-Identifier: MIT OR Apache-2.0
//! Process-wide service composing many harnesses.
//!
//! Shutdown is sequential over harnesses to keep the logs readable.

use crate::harness::AgentHarness;
use crate::{Agent, RuntimeError};
use cortex_authority::AuthorityProvider;
use cortex_bus::{MessageBus, StopSignal};
use cortex_registry::AgentRegistry;
use cortex_telemetry::RuntimeCounters;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Starts, tracks, and stops agent harnesses; groups agents into teams.
pub struct AgentRuntime {
    bus: Arc<dyn MessageBus>,
    registry: Arc<AgentRegistry>,
    authority: Option<Arc<AuthorityProvider>>,
    counters: Arc<RuntimeCounters>,
    startup: Vec<Arc<dyn Agent>>,
    harnesses: RwLock<HashMap<String, Arc<AgentHarness>>>,
    teams: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl AgentRuntime {
    /// Build a runtime with no startup agents.
    #[must_use]
    pub fn new(bus: Arc<dyn MessageBus>, registry: Arc<AgentRegistry>) -> Self {
        Self {
            bus,
            registry,
            authority: None,
            counters: Arc::new(RuntimeCounters::new()),
            startup: Vec::new(),
            harnesses: RwLock::new(HashMap::new()),
            teams: RwLock::new(HashMap::new()),
        }
    }

    /// Gate every harness started by this runtime with the provider.
    #[must_use]
    pub fn with_authority(mut self, authority: Arc<AuthorityProvider>) -> Self {
        self.authority = Some(authority);
        self
    }

    /// Agents started automatically by [`start`](Self::start).
    #[must_use]
    pub fn with_startup_agents(mut self, agents: Vec<Arc<dyn Agent>>) -> Self {
        self.startup = agents;
        self
    }

    /// The shared agent registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Counters shared by every harness this runtime starts.
    #[must_use]
    pub fn counters(&self) -> &Arc<RuntimeCounters> {
        &self.counters
    }

    /// Hosted start: bring up every startup agent in order.
    ///
    /// # Errors
    ///
    /// Fails on the first agent that cannot start; agents already started
    /// stay up.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        for agent in self.startup.clone() {
            self.start_agent(agent, None).await?;
        }
        info!(target: "cortex.runtime", "runtime started");
        Ok(())
    }

    /// Build and start a harness for a dynamic agent, optionally joining
    /// it to a team.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::DuplicateAgent`] when the id is already
    /// running, or [`RuntimeError::Bus`] when the consumer cannot attach.
    pub async fn start_agent(
        &self,
        agent: Arc<dyn Agent>,
        team_id: Option<&str>,
    ) -> Result<(), RuntimeError> {
        let agent_id = agent.agent_id().to_string();
        let mut harness = AgentHarness::new(
            agent,
            Arc::clone(&self.bus),
            Arc::clone(&self.registry),
        )
        .with_counters(Arc::clone(&self.counters));
        if let Some(authority) = &self.authority {
            harness = harness.with_authority(Arc::clone(authority));
        }
        let harness = Arc::new(harness);

        {
            let mut harnesses = self.harnesses.write().expect("harness map poisoned");
            if harnesses.contains_key(&agent_id) {
                return Err(RuntimeError::DuplicateAgent { agent_id });
            }
            harnesses.insert(agent_id.clone(), Arc::clone(&harness));
        }

        if let Err(error) = harness.start().await {
            self.harnesses
                .write()
                .expect("harness map poisoned")
                .remove(&agent_id);
            return Err(error);
        }

        if let Some(team_id) = team_id {
            self.teams
                .write()
                .expect("team map poisoned")
                .entry(team_id.to_string())
                .or_default()
                .insert(agent_id.clone());
            info!(target: "cortex.runtime", agent = %agent_id, team = %team_id, "agent joined team");
        }
        Ok(())
    }

    /// Stop a running agent and drop it from every team it belonged to.
    ///
    /// Stopping a non-running agent is a no-op with a warning.
    pub async fn stop_agent(&self, agent_id: &str) {
        let harness = {
            self.harnesses
                .write()
                .expect("harness map poisoned")
                .remove(agent_id)
        };
        let Some(harness) = harness else {
            warn!(target: "cortex.runtime", agent = %agent_id, "stop requested for non-running agent");
            return;
        };
        harness.stop().await;

        // Team membership is rewritten, not patched in place.
        let mut teams = self.teams.write().expect("team map poisoned");
        for members in teams.values_mut() {
            if members.contains(agent_id) {
                let rebuilt: BTreeSet<String> = members
                    .iter()
                    .filter(|m| m.as_str() != agent_id)
                    .cloned()
                    .collect();
                *members = rebuilt;
            }
        }
    }

    /// Snapshot of a team's membership.
    #[must_use]
    pub fn get_team_agent_ids(&self, team_id: &str) -> Vec<String> {
        self.teams
            .read()
            .expect("team map poisoned")
            .get(team_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Stop every member of a team, then remove the team.
    pub async fn stop_team(&self, team_id: &str) {
        let members = self.get_team_agent_ids(team_id);
        for agent_id in members {
            self.stop_agent(&agent_id).await;
        }
        self.teams
            .write()
            .expect("team map poisoned")
            .remove(team_id);
        info!(target: "cortex.runtime", team = %team_id, "team stopped");
    }

    /// Snapshot of currently running agent ids, sorted.
    #[must_use]
    pub fn running_agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .harnesses
            .read()
            .expect("harness map poisoned")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// `true` when a harness for the agent is currently tracked.
    #[must_use]
    pub fn is_running(&self, agent_id: &str) -> bool {
        self.harnesses
            .read()
            .expect("harness map poisoned")
            .contains_key(agent_id)
    }

    /// Hosted stop: stop every running harness, sequentially.
    pub async fn shutdown(&self) {
        let ids = self.running_agent_ids();
        for agent_id in ids {
            self.stop_agent(&agent_id).await;
        }
        info!(target: "cortex.runtime", "runtime stopped");
    }

    /// Hosted-service loop: start, wait for the stop signal, shut down.
    ///
    /// # Errors
    ///
    /// Propagates startup failures; shutdown itself is infallible.
    pub async fn serve(&self, stop: StopSignal) -> Result<(), RuntimeError> {
        self.start().await?;
        stop.wait().await;
        self.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cortex_bus::InMemoryBus;
    use cortex_core::{AgentCapability, MessageEnvelope};

    struct Inert(String);

    #[async_trait]
    impl Agent for Inert {
        fn agent_id(&self) -> &str {
            &self.0
        }
        fn name(&self) -> &str {
            &self.0
        }
        fn capabilities(&self) -> Vec<AgentCapability> {
            Vec::new()
        }
        async fn process(
            &self,
            _envelope: MessageEnvelope,
        ) -> anyhow::Result<Option<MessageEnvelope>> {
            Ok(None)
        }
    }

    fn runtime() -> AgentRuntime {
        AgentRuntime::new(Arc::new(InMemoryBus::new()), Arc::new(AgentRegistry::new()))
    }

    #[tokio::test]
    async fn duplicate_agent_ids_are_rejected() {
        let rt = runtime();
        rt.start_agent(Arc::new(Inert("a".into())), None).await.unwrap();
        let err = rt
            .start_agent(Arc::new(Inert("a".into())), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::DuplicateAgent { .. }));
        assert_eq!(rt.running_agent_ids(), vec!["a"]);
    }

    #[tokio::test]
    async fn team_membership_tracks_starts_and_stops() {
        let rt = runtime();
        rt.start_agent(Arc::new(Inert("a".into())), Some("ops")).await.unwrap();
        rt.start_agent(Arc::new(Inert("b".into())), Some("ops")).await.unwrap();
        assert_eq!(rt.get_team_agent_ids("ops"), vec!["a", "b"]);

        rt.stop_agent("a").await;
        assert_eq!(rt.get_team_agent_ids("ops"), vec!["b"]);
        assert!(!rt.is_running("a"));
    }

    #[tokio::test]
    async fn stop_team_stops_every_member_and_removes_the_team() {
        let rt = runtime();
        rt.start_agent(Arc::new(Inert("a".into())), Some("ops")).await.unwrap();
        rt.start_agent(Arc::new(Inert("b".into())), Some("ops")).await.unwrap();
        rt.start_agent(Arc::new(Inert("c".into())), None).await.unwrap();

        rt.stop_team("ops").await;
        assert!(rt.get_team_agent_ids("ops").is_empty());
        assert_eq!(rt.running_agent_ids(), vec!["c"]);
    }

    #[tokio::test]
    async fn stopping_a_non_running_agent_is_a_no_op() {
        let rt = runtime();
        rt.stop_agent("ghost").await;
        assert!(rt.running_agent_ids().is_empty());
    }

    #[tokio::test]
    async fn startup_roster_comes_up_with_start() {
        let rt = AgentRuntime::new(Arc::new(InMemoryBus::new()), Arc::new(AgentRegistry::new()))
            .with_startup_agents(vec![
                Arc::new(Inert("one".into())),
                Arc::new(Inert("two".into())),
            ]);
        rt.start().await.unwrap();
        assert_eq!(rt.running_agent_ids(), vec!["one", "two"]);

        rt.shutdown().await;
        assert!(rt.running_agent_ids().is_empty());
    }

    #[tokio::test]
    async fn serve_runs_until_stopped() {
        let rt = Arc::new(
            AgentRuntime::new(Arc::new(InMemoryBus::new()), Arc::new(AgentRegistry::new()))
                .with_startup_agents(vec![Arc::new(Inert("one".into()))]),
        );
        let stop = StopSignal::new();
        let serving = {
            let rt = Arc::clone(&rt);
            let stop = stop.clone();
            tokio::spawn(async move { rt.serve(stop).await })
        };
        // Give startup a beat, then signal shutdown.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(rt.is_running("one"));
        stop.raise();
        serving.await.unwrap().unwrap();
        assert!(rt.running_agent_ids().is_empty());
    }
}
