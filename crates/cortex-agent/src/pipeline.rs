// SPDX-License-Identifier: MIT OR Apache-2.0
//! The skill pipeline runner.
//!
//! Skills run strictly sequentially. A missing definition or executor is
//! logged and skipped; an executor error leaves an empty result slot for
//! later skills (and downstream logic) to observe. The runner itself never
//! fails.

use async_trait::async_trait;
use cortex_core::{Message, MessageEnvelope, SkillDefinition};
use cortex_registry::SkillRegistry;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Parameter key under which the envelope travels into every skill call.
pub const PARAM_ENVELOPE: &str = "envelope";
/// Parameter key under which prior results travel into every skill call.
pub const PARAM_RESULTS: &str = "results";
/// Caller-supplied key carrying the inbound message text.
pub const PARAM_MESSAGE_CONTENT: &str = "message_content";
/// Caller-supplied key carrying the fleet's capability listing.
pub const PARAM_AVAILABLE_CAPABILITIES: &str = "available_capabilities";

/// Executes one kind of skill, identified by
/// [`executor_type`](Self::executor_type).
#[async_trait]
pub trait SkillExecutor: Send + Sync {
    /// The `executor_type` value this executor serves.
    fn executor_type(&self) -> &str;

    /// Run one skill. `Ok(None)` means the skill produced no structured
    /// output; errors are recorded as empty result slots by the runner.
    async fn execute(
        &self,
        definition: &SkillDefinition,
        parameters: &BTreeMap<String, Value>,
    ) -> anyhow::Result<Option<Value>>;
}

/// The state threaded through one pipeline invocation.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// The envelope the pipeline is running against.
    pub envelope: MessageEnvelope,
    /// Caller-supplied parameters, passed to every skill.
    pub parameters: BTreeMap<String, Value>,
    /// Per-skill results in insertion order. `None` marks a skill that ran
    /// but produced nothing usable.
    pub results: Vec<(String, Option<Value>)>,
}

impl PipelineContext {
    /// The result slot for a skill id, if that skill ran.
    #[must_use]
    pub fn result(&self, skill_id: &str) -> Option<&Option<Value>> {
        self.results
            .iter()
            .find(|(id, _)| id == skill_id)
            .map(|(_, value)| value)
    }
}

/// Runs an ordered list of skills against an envelope.
pub struct SkillPipelineRunner {
    skills: Arc<SkillRegistry>,
    executors: HashMap<String, Arc<dyn SkillExecutor>>,
}

impl SkillPipelineRunner {
    /// Runner over a skill registry with no executors.
    #[must_use]
    pub fn new(skills: Arc<SkillRegistry>) -> Self {
        Self {
            skills,
            executors: HashMap::new(),
        }
    }

    /// Register an executor under its declared type.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn SkillExecutor>) -> Self {
        self.executors
            .insert(executor.executor_type().to_string(), executor);
        self
    }

    /// Run the given skills in order.
    ///
    /// Each call receives the caller parameters plus `envelope` and the
    /// accumulated `results`; the reserved keys win over caller-supplied
    /// ones.
    pub async fn run(
        &self,
        skill_ids: &[String],
        envelope: &MessageEnvelope,
        additional_parameters: BTreeMap<String, Value>,
    ) -> PipelineContext {
        let mut context = PipelineContext {
            envelope: envelope.clone(),
            parameters: additional_parameters,
            results: Vec::new(),
        };

        for skill_id in skill_ids {
            let Some(definition) = self.skills.get(skill_id) else {
                warn!(target: "cortex.agent", skill = %skill_id, "skill not registered; skipping");
                continue;
            };
            let Some(executor) = self.executors.get(&definition.executor_type) else {
                warn!(
                    target: "cortex.agent",
                    skill = %skill_id,
                    executor_type = %definition.executor_type,
                    "no executor for skill; skipping"
                );
                continue;
            };

            let mut parameters = context.parameters.clone();
            parameters.insert(
                PARAM_ENVELOPE.to_string(),
                serde_json::to_value(&context.envelope).unwrap_or(Value::Null),
            );
            let results_so_far: BTreeMap<&str, &Option<Value>> = context
                .results
                .iter()
                .map(|(id, value)| (id.as_str(), value))
                .collect();
            parameters.insert(
                PARAM_RESULTS.to_string(),
                serde_json::to_value(&results_so_far).unwrap_or(Value::Null),
            );

            let slot = match executor.execute(&definition, &parameters).await {
                Ok(value) => {
                    debug!(
                        target: "cortex.agent",
                        skill = %skill_id,
                        produced = value.is_some(),
                        "skill completed"
                    );
                    value
                }
                Err(error) => {
                    warn!(target: "cortex.agent", skill = %skill_id, %error, "skill failed");
                    None
                }
            };
            context.results.push((skill_id.clone(), slot));
        }
        context
    }
}

/// Build the standard caller parameters for a goal envelope.
#[must_use]
pub fn goal_parameters(
    envelope: &MessageEnvelope,
    available_capabilities: &[String],
) -> BTreeMap<String, Value> {
    let mut parameters = BTreeMap::new();
    parameters.insert(
        PARAM_MESSAGE_CONTENT.to_string(),
        Value::String(envelope.message.content()),
    );
    parameters.insert(
        PARAM_AVAILABLE_CAPABILITIES.to_string(),
        Value::Array(
            available_capabilities
                .iter()
                .map(|c| Value::String(c.clone()))
                .collect(),
        ),
    );
    parameters
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::Payload;

    fn definition(skill_id: &str, executor_type: &str) -> SkillDefinition {
        SkillDefinition {
            skill_id: skill_id.to_string(),
            name: skill_id.to_string(),
            description: "test skill".to_string(),
            category: "test".to_string(),
            executor_type: executor_type.to_string(),
            content: None,
        }
    }

    fn envelope() -> MessageEnvelope {
        MessageEnvelope::new(
            Payload::text("do the thing"),
            "CTX-2026-0801-001".parse().unwrap(),
        )
    }

    struct Fixed {
        executor_type: String,
        value: Option<Value>,
    }

    #[async_trait]
    impl SkillExecutor for Fixed {
        fn executor_type(&self) -> &str {
            &self.executor_type
        }
        async fn execute(
            &self,
            _definition: &SkillDefinition,
            _parameters: &BTreeMap<String, Value>,
        ) -> anyhow::Result<Option<Value>> {
            Ok(self.value.clone())
        }
    }

    struct Exploding;

    #[async_trait]
    impl SkillExecutor for Exploding {
        fn executor_type(&self) -> &str {
            "exploding"
        }
        async fn execute(
            &self,
            _definition: &SkillDefinition,
            _parameters: &BTreeMap<String, Value>,
        ) -> anyhow::Result<Option<Value>> {
            anyhow::bail!("skill blew up")
        }
    }

    struct ParamSpy;

    #[async_trait]
    impl SkillExecutor for ParamSpy {
        fn executor_type(&self) -> &str {
            "spy"
        }
        async fn execute(
            &self,
            _definition: &SkillDefinition,
            parameters: &BTreeMap<String, Value>,
        ) -> anyhow::Result<Option<Value>> {
            Ok(Some(serde_json::json!({
                "saw_envelope": parameters.contains_key(PARAM_ENVELOPE),
                "saw_results": parameters.contains_key(PARAM_RESULTS),
                "results": parameters.get(PARAM_RESULTS).cloned(),
            })))
        }
    }

    fn registry_with(definitions: Vec<SkillDefinition>) -> Arc<SkillRegistry> {
        let registry = SkillRegistry::new();
        for definition in definitions {
            registry.register(definition);
        }
        Arc::new(registry)
    }

    #[tokio::test]
    async fn results_accumulate_in_order() {
        let runner = SkillPipelineRunner::new(registry_with(vec![
            definition("first", "fixed"),
            definition("second", "fixed"),
        ]))
        .with_executor(Arc::new(Fixed {
            executor_type: "fixed".into(),
            value: Some(serde_json::json!({"step": true})),
        }));

        let context = runner
            .run(
                &["first".into(), "second".into()],
                &envelope(),
                BTreeMap::new(),
            )
            .await;
        let ids: Vec<&str> = context.results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn missing_skills_and_executors_are_skipped() {
        let runner = SkillPipelineRunner::new(registry_with(vec![definition(
            "orphan",
            "unregistered-executor",
        )]));
        let context = runner
            .run(
                &["ghost".into(), "orphan".into()],
                &envelope(),
                BTreeMap::new(),
            )
            .await;
        assert!(context.results.is_empty());
    }

    #[tokio::test]
    async fn executor_failure_leaves_an_empty_slot() {
        let runner = SkillPipelineRunner::new(registry_with(vec![definition("boom", "exploding")]))
            .with_executor(Arc::new(Exploding));
        let context = runner
            .run(&["boom".into()], &envelope(), BTreeMap::new())
            .await;
        assert_eq!(context.result("boom"), Some(&None));
    }

    #[tokio::test]
    async fn reserved_keys_are_injected_per_call() {
        let runner = SkillPipelineRunner::new(registry_with(vec![
            definition("first", "fixed"),
            definition("watcher", "spy"),
        ]))
        .with_executor(Arc::new(Fixed {
            executor_type: "fixed".into(),
            value: Some(serde_json::json!("early")),
        }))
        .with_executor(Arc::new(ParamSpy));

        let context = runner
            .run(
                &["first".into(), "watcher".into()],
                &envelope(),
                BTreeMap::new(),
            )
            .await;
        let spied = context.result("watcher").unwrap().as_ref().unwrap();
        assert_eq!(spied["saw_envelope"], true);
        assert_eq!(spied["saw_results"], true);
        assert_eq!(spied["results"]["first"], "early");
    }

    #[tokio::test]
    async fn goal_parameters_carry_content_and_capabilities() {
        let parameters = goal_parameters(
            &envelope(),
            &["email-drafting: drafts email".to_string()],
        );
        assert_eq!(
            parameters[PARAM_MESSAGE_CONTENT],
            Value::String("do the thing".into())
        );
        assert!(parameters[PARAM_AVAILABLE_CAPABILITIES].is_array());
    }
}
