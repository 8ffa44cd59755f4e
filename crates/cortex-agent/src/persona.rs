// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persona configuration.
//!
//! Personas are authored externally (markdown, config files); the agent
//! consumes the resolved definition only.

use cortex_core::{AgentCapability, AgentType};
use serde::{Deserialize, Serialize};

fn default_confidence_threshold() -> f64 {
    0.6
}

/// Resolved configuration for one skill-driven agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaDefinition {
    /// Agent id; the inbox queue is `agent.<id>`.
    pub agent_id: String,
    /// Display name.
    pub name: String,
    /// Actor kind advertised in the registry.
    pub agent_type: AgentType,
    /// Capabilities advertised in the registry.
    pub capabilities: Vec<AgentCapability>,
    /// Skill ids run, in order, against every new goal.
    pub pipeline: Vec<String>,
    /// Queue unroutable or gated work is forwarded to.
    pub escalation_target: String,
    /// Preferred model tier for LLM skills.
    pub model_tier: Option<String>,
    /// Decompositions below this confidence escalate.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

impl PersonaDefinition {
    /// Minimal persona with the default confidence threshold.
    #[must_use]
    pub fn new(
        agent_id: impl Into<String>,
        name: impl Into<String>,
        escalation_target: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            agent_type: AgentType::Ai,
            capabilities: Vec::new(),
            pipeline: Vec::new(),
            escalation_target: escalation_target.into(),
            model_tier: None,
            confidence_threshold: default_confidence_threshold(),
        }
    }

    /// Replace the pipeline.
    #[must_use]
    pub fn with_pipeline<I, S>(mut self, skill_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pipeline = skill_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the advertised capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Vec<AgentCapability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Override the confidence threshold.
    #[must_use]
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_defaults_to_point_six() {
        let persona = PersonaDefinition::new("cos", "Chief of Staff", "agent.founder");
        assert!((persona.confidence_threshold - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn threshold_defaults_when_absent_from_serde() {
        let persona: PersonaDefinition = serde_json::from_str(
            r#"{
                "agent_id": "cos",
                "name": "Chief of Staff",
                "agent_type": "ai",
                "capabilities": [],
                "pipeline": ["decompose-goal"],
                "escalation_target": "agent.founder",
                "model_tier": null
            }"#,
        )
        .unwrap();
        assert!((persona.confidence_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(persona.pipeline, vec!["decompose-goal"]);
    }
}
