// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! cortex-registry
#![deny(unsafe_code)]
#![warn(missing_docs)]

use cortex_core::{AgentRegistration, SkillDefinition};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

// ---------------------------------------------------------------------------
// AgentRegistry
// ---------------------------------------------------------------------------

/// Concurrent registry of [`AgentRegistration`]s keyed by agent id.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentRegistration>>,
}

impl AgentRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a registration.
    pub fn register(&self, registration: AgentRegistration) {
        debug!(
            target: "cortex.registry",
            agent_id = %registration.agent_id,
            available = registration.is_available,
            "registered agent"
        );
        self.agents
            .write()
            .expect("agent registry poisoned")
            .insert(registration.agent_id.clone(), registration);
    }

    /// Look up a registration by agent id.
    #[must_use]
    pub fn get(&self, agent_id: &str) -> Option<AgentRegistration> {
        self.agents
            .read()
            .expect("agent registry poisoned")
            .get(agent_id)
            .cloned()
    }

    /// Flip an agent's availability. Returns `false` when the agent is not
    /// registered.
    pub fn set_available(&self, agent_id: &str, available: bool) -> bool {
        let mut agents = self.agents.write().expect("agent registry poisoned");
        match agents.get_mut(agent_id) {
            Some(registration) => {
                registration.is_available = available;
                true
            }
            None => false,
        }
    }

    /// Available agents offering the named capability.
    ///
    /// Matching is case-insensitive on the capability name; results are
    /// ordered by agent id so "pick the first" routing is stable.
    #[must_use]
    pub fn find_by_capability(&self, capability: &str) -> Vec<AgentRegistration> {
        let wanted = capability.to_ascii_lowercase();
        let agents = self.agents.read().expect("agent registry poisoned");
        let mut matches: Vec<AgentRegistration> = agents
            .values()
            .filter(|a| {
                a.is_available
                    && a.capabilities
                        .iter()
                        .any(|c| c.name.to_ascii_lowercase() == wanted)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        matches
    }

    /// Every registration, available or not, ordered by agent id.
    #[must_use]
    pub fn enumerate_all(&self) -> Vec<AgentRegistration> {
        let agents = self.agents.read().expect("agent registry poisoned");
        let mut all: Vec<AgentRegistration> = agents.values().cloned().collect();
        all.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        all
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.read().expect("agent registry poisoned").len()
    }

    /// `true` when no agent is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// SkillRegistry
// ---------------------------------------------------------------------------

/// Concurrent registry of [`SkillDefinition`]s keyed by skill id.
#[derive(Debug, Default)]
pub struct SkillRegistry {
    skills: RwLock<HashMap<String, SkillDefinition>>,
}

impl SkillRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a definition.
    pub fn register(&self, definition: SkillDefinition) {
        self.skills
            .write()
            .expect("skill registry poisoned")
            .insert(definition.skill_id.clone(), definition);
    }

    /// Look up a definition by skill id.
    #[must_use]
    pub fn get(&self, skill_id: &str) -> Option<SkillDefinition> {
        self.skills
            .read()
            .expect("skill registry poisoned")
            .get(skill_id)
            .cloned()
    }

    /// Every definition, ordered by skill id.
    #[must_use]
    pub fn all(&self) -> Vec<SkillDefinition> {
        let skills = self.skills.read().expect("skill registry poisoned");
        let mut all: Vec<SkillDefinition> = skills.values().cloned().collect();
        all.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));
        all
    }
}
