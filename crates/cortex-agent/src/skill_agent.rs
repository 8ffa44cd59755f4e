// SPDX-License-Identifier: MIT OR Apache-2.0
//! The skill-driven agent.
//!
//! One type drives every AI agent; behaviour comes from the persona and
//! its skill pipeline. Inbound envelopes are classified in a fixed order:
//!
//! 1. sub-task reply — decided by workflow-tracker lookup, never by
//!    payload type, because a specialist's reply payload is arbitrary;
//! 2. plan approval response;
//! 3. new goal — decomposition, gating, routing.

use crate::persona::PersonaDefinition;
use crate::pipeline::{PipelineContext, SkillPipelineRunner, goal_parameters};
use cortex_bus::MessageBus;
use cortex_core::{
    AuthorityClaim, AuthorityTier, DecompositionResult, DelegationRecord, DelegationStatus,
    Message, MessageEnvelope, PendingPlan, Payload, PlanApprovalResponse, PlanProposal,
    MessageMeta, ReferenceCode, ReferenceCodeGenerator, TaskSpec, WorkflowRecord, WorkflowStatus,
    agent_queue,
};
use cortex_registry::AgentRegistry;
use cortex_runtime::Agent;
use cortex_telemetry::RuntimeCounters;
use cortex_tracker::{DelegationTracker, PendingPlanStore, WorkflowTracker};
use async_trait::async_trait;
use chrono::Utc;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A persona-configured orchestrating agent.
pub struct SkillDrivenAgent {
    persona: PersonaDefinition,
    bus: Arc<dyn MessageBus>,
    registry: Arc<AgentRegistry>,
    delegations: Arc<DelegationTracker>,
    workflows: Arc<dyn WorkflowTracker>,
    pending: Arc<PendingPlanStore>,
    references: Arc<ReferenceCodeGenerator>,
    pipeline: Arc<SkillPipelineRunner>,
    counters: Arc<RuntimeCounters>,
}

impl SkillDrivenAgent {
    /// Wire an agent from its persona and collaborators.
    ///
    /// Pass [`NullWorkflowTracker`](cortex_tracker::NullWorkflowTracker)
    /// as the tracker to disable aggregation.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        persona: PersonaDefinition,
        bus: Arc<dyn MessageBus>,
        registry: Arc<AgentRegistry>,
        delegations: Arc<DelegationTracker>,
        workflows: Arc<dyn WorkflowTracker>,
        pending: Arc<PendingPlanStore>,
        references: Arc<ReferenceCodeGenerator>,
        pipeline: Arc<SkillPipelineRunner>,
    ) -> Self {
        Self {
            persona,
            bus,
            registry,
            delegations,
            workflows,
            pending,
            references,
            pipeline,
            counters: Arc::new(RuntimeCounters::new()),
        }
    }

    /// Share a counter set, typically the runtime-wide one, instead of
    /// this agent's private counters.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<RuntimeCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// The persona this agent runs.
    #[must_use]
    pub fn persona(&self) -> &PersonaDefinition {
        &self.persona
    }

    /// The counters this agent increments.
    #[must_use]
    pub fn counters(&self) -> &Arc<RuntimeCounters> {
        &self.counters
    }

    // -- branch A: sub-task reply -----------------------------------------

    async fn handle_subtask_reply(
        &self,
        workflow: WorkflowRecord,
        envelope: MessageEnvelope,
    ) -> anyhow::Result<Option<MessageEnvelope>> {
        let subtask = envelope.reference_code.clone();
        self.workflows.store_result(&subtask, envelope).await;
        self.delegations
            .update_status(&subtask, DelegationStatus::Complete);
        debug!(
            target: "cortex.agent",
            agent = %self.persona.agent_id,
            workflow = %workflow.reference_code,
            subtask = %subtask,
            "sub-task result stored"
        );

        if !self
            .workflows
            .all_subtasks_complete(&workflow.reference_code)
            .await
        {
            return Ok(None);
        }

        let results = self
            .workflows
            .completed_results(&workflow.reference_code)
            .await;
        let mut assembled = workflow.summary.clone();
        for (reference, result) in &results {
            write!(assembled, "\n\n## {reference}\n{}", result.message.content())?;
        }

        let Some(reply_to) = workflow.original_envelope.context.reply_to.clone() else {
            warn!(
                target: "cortex.agent",
                agent = %self.persona.agent_id,
                workflow = %workflow.reference_code,
                "workflow complete but the original envelope has no reply_to; dropping summary"
            );
            self.workflows
                .set_status(&workflow.reference_code, WorkflowStatus::Completed)
                .await;
            self.counters.workflow_completed();
            return Ok(None);
        };

        let context = workflow
            .original_envelope
            .context
            .clone()
            .with_from_agent(&self.persona.agent_id);
        let summary_envelope = MessageEnvelope::builder(
            Payload::text(assembled),
            workflow.reference_code.clone(),
        )
        .context(context)
        .build();
        self.bus.publish(summary_envelope, &reply_to).await?;
        self.workflows
            .set_status(&workflow.reference_code, WorkflowStatus::Completed)
            .await;
        self.counters.workflow_completed();
        info!(
            target: "cortex.agent",
            agent = %self.persona.agent_id,
            workflow = %workflow.reference_code,
            subtasks = results.len(),
            "workflow completed and summary published"
        );
        Ok(None)
    }

    // -- branch B: plan approval response ---------------------------------

    async fn handle_plan_approval(
        &self,
        response: PlanApprovalResponse,
    ) -> anyhow::Result<Option<MessageEnvelope>> {
        let Some(plan) = self.pending.take(&response.workflow_reference_code) else {
            warn!(
                target: "cortex.agent",
                agent = %self.persona.agent_id,
                workflow = %response.workflow_reference_code,
                "approval response for unknown plan; dropping"
            );
            return Ok(None);
        };

        if response.approved {
            info!(
                target: "cortex.agent",
                agent = %self.persona.agent_id,
                workflow = %response.workflow_reference_code,
                "plan approved; resuming dispatch"
            );
            return self
                .route(
                    plan.decomposition,
                    plan.original_envelope,
                    Some(response.workflow_reference_code),
                )
                .await;
        }

        let Some(reply_to) = plan.original_envelope.context.reply_to.clone() else {
            return Ok(None);
        };
        let reason = response
            .rejection_reason
            .as_deref()
            .unwrap_or("no reason given");
        let rejection = MessageEnvelope::builder(
            Payload::text(format!(
                "Plan rejected: {reason} (goal: {})",
                plan.original_envelope.message.content()
            )),
            response.workflow_reference_code.clone(),
        )
        .context(
            plan.original_envelope
                .context
                .clone()
                .with_from_agent(&self.persona.agent_id),
        )
        .build();
        self.bus.publish(rejection, &reply_to).await?;
        Ok(None)
    }

    // -- branch C: new goal ------------------------------------------------

    async fn handle_new_goal(
        &self,
        envelope: MessageEnvelope,
    ) -> anyhow::Result<Option<MessageEnvelope>> {
        let capabilities: Vec<String> = self
            .registry
            .enumerate_all()
            .iter()
            .flat_map(|agent| {
                agent
                    .capabilities
                    .iter()
                    .map(|c| format!("{}: {}", c.name, c.description))
            })
            .collect();
        let parameters = goal_parameters(&envelope, &capabilities);
        let context = self
            .pipeline
            .run(&self.persona.pipeline, &envelope, parameters)
            .await;

        let Some(decomposition) = extract_decomposition(&context) else {
            return self.escalate("No decomposition result", envelope).await;
        };
        if decomposition.confidence < self.persona.confidence_threshold {
            return self
                .escalate(
                    &format!(
                        "Low confidence ({:.2} < {:.2})",
                        decomposition.confidence, self.persona.confidence_threshold
                    ),
                    envelope,
                )
                .await;
        }
        if decomposition.tasks.is_empty() {
            return self.escalate("Empty task list", envelope).await;
        }

        // AskMeFirst gate: park the plan and ask before any dispatch.
        if envelope.max_claim_tier() >= AuthorityTier::AskMeFirst {
            return self.propose_plan(decomposition, envelope).await;
        }

        self.route(decomposition, envelope, None).await
    }

    async fn propose_plan(
        &self,
        decomposition: DecompositionResult,
        envelope: MessageEnvelope,
    ) -> anyhow::Result<Option<MessageEnvelope>> {
        let parent = self.references.generate()?;
        let proposal = PlanProposal {
            meta: MessageMeta::new(),
            summary: decomposition.summary.clone(),
            task_descriptions: decomposition
                .tasks
                .iter()
                .map(|t| t.description.clone())
                .collect(),
            original_goal: envelope.message.content(),
            workflow_reference_code: parent.clone(),
        };
        self.pending.store(
            &parent,
            PendingPlan {
                original_envelope: envelope.clone(),
                decomposition,
                stored_at: Utc::now(),
            },
        );

        let proposal_envelope = MessageEnvelope::builder(
            Payload::PlanProposal(proposal),
            parent.clone(),
        )
        .context(
            envelope
                .context
                .clone()
                .with_parent_message(envelope.message.message_id())
                .with_from_agent(&self.persona.agent_id),
        )
        .build();
        self.bus
            .publish(proposal_envelope, &self.persona.escalation_target)
            .await?;
        info!(
            target: "cortex.agent",
            agent = %self.persona.agent_id,
            workflow = %parent,
            "plan parked pending approval"
        );
        Ok(None)
    }

    /// The routing step shared by branch C and approved-plan resumption.
    async fn route(
        &self,
        decomposition: DecompositionResult,
        envelope: MessageEnvelope,
        preallocated_parent: Option<ReferenceCode>,
    ) -> anyhow::Result<Option<MessageEnvelope>> {
        if decomposition.tasks.len() == 1 {
            let task = decomposition.tasks.into_iter().next().expect("one task");
            return self.route_single(task, envelope).await;
        }
        self.fan_out(decomposition, envelope, preallocated_parent).await
    }

    async fn route_single(
        &self,
        task: TaskSpec,
        envelope: MessageEnvelope,
    ) -> anyhow::Result<Option<MessageEnvelope>> {
        let Some(target) = self.first_candidate(&task.capability) else {
            return self
                .escalate(
                    &format!("No agent with capability {}", task.capability),
                    envelope,
                )
                .await;
        };

        let task_tier = AuthorityTier::parse_or_default(task.authority_tier.as_deref());
        let effective_tier = task_tier.min(envelope.max_claim_tier());
        let child = self.references.generate()?;

        self.delegations.record(DelegationRecord::assigned(
            child.clone(),
            &self.persona.agent_id,
            &target,
            &task.description,
        ));

        let claim = AuthorityClaim::new(&self.persona.agent_id, &target, effective_tier);
        let context = envelope
            .context
            .clone()
            .with_parent_message(envelope.message.message_id())
            .with_from_agent(&self.persona.agent_id);
        let child_envelope = envelope
            .with_reference_code(child.clone())
            .with_claims(vec![claim])
            .with_context(context);
        self.bus
            .publish(child_envelope, &agent_queue(&target))
            .await?;
        info!(
            target: "cortex.agent",
            agent = %self.persona.agent_id,
            %target,
            reference = %child,
            tier = %effective_tier,
            "task routed"
        );
        Ok(None)
    }

    async fn fan_out(
        &self,
        decomposition: DecompositionResult,
        envelope: MessageEnvelope,
        preallocated_parent: Option<ReferenceCode>,
    ) -> anyhow::Result<Option<MessageEnvelope>> {
        // Pre-validate every capability so a half-dispatched workflow can
        // never exist.
        let mut targets = Vec::with_capacity(decomposition.tasks.len());
        for task in &decomposition.tasks {
            match self.first_candidate(&task.capability) {
                Some(target) => targets.push(target),
                None => {
                    return self
                        .escalate(
                            &format!(
                                "Cannot decompose: no agent with capability {}",
                                task.capability
                            ),
                            envelope,
                        )
                        .await;
                }
            }
        }

        let parent = match preallocated_parent {
            Some(parent) => parent,
            None => self.references.generate()?,
        };
        let inbound_tier = envelope.max_claim_tier();
        let mut children = Vec::with_capacity(decomposition.tasks.len());

        for (task, target) in decomposition.tasks.iter().zip(&targets) {
            let child = self.references.generate()?;
            self.delegations.record(DelegationRecord::assigned(
                child.clone(),
                &self.persona.agent_id,
                target,
                &task.description,
            ));

            let task_tier = AuthorityTier::parse_or_default(task.authority_tier.as_deref());
            let claim = AuthorityClaim::new(
                &self.persona.agent_id,
                target,
                task_tier.min(inbound_tier),
            );
            // Children reply to this agent, not the original requester.
            let context = envelope
                .context
                .clone()
                .with_parent_message(envelope.message.message_id())
                .with_from_agent(&self.persona.agent_id)
                .with_reply_to(agent_queue(&self.persona.agent_id))
                .with_original_goal(&decomposition.summary);
            let child_envelope = envelope
                .with_reference_code(child.clone())
                .with_claims(vec![claim])
                .with_context(context);
            self.bus.publish(child_envelope, &agent_queue(target)).await?;
            children.push(child);
        }

        self.workflows
            .create(WorkflowRecord::new(
                parent.clone(),
                envelope,
                children.clone(),
                decomposition.summary.clone(),
            ))
            .await;
        info!(
            target: "cortex.agent",
            agent = %self.persona.agent_id,
            workflow = %parent,
            subtasks = children.len(),
            "workflow fanned out"
        );
        Ok(None)
    }

    async fn escalate(
        &self,
        reason: &str,
        envelope: MessageEnvelope,
    ) -> anyhow::Result<Option<MessageEnvelope>> {
        let reference = self.references.generate()?;
        self.delegations.record(DelegationRecord::assigned(
            reference.clone(),
            &self.persona.agent_id,
            &self.persona.escalation_target,
            format!("Escalated: {reason}"),
        ));

        let context = envelope
            .context
            .clone()
            .with_parent_message(envelope.message.message_id())
            .with_from_agent(&self.persona.agent_id);
        let escalated = envelope
            .with_reference_code(reference.clone())
            .with_context(context);
        self.bus
            .publish(escalated, &self.persona.escalation_target)
            .await?;
        self.counters.escalation();
        warn!(
            target: "cortex.agent",
            agent = %self.persona.agent_id,
            %reason,
            reference = %reference,
            target = %self.persona.escalation_target,
            "goal escalated"
        );
        Ok(None)
    }

    /// First available non-self agent with the capability, by stable order.
    fn first_candidate(&self, capability: &str) -> Option<String> {
        self.registry
            .find_by_capability(capability)
            .into_iter()
            .map(|registration| registration.agent_id)
            .find(|agent_id| agent_id != &self.persona.agent_id)
    }
}

#[async_trait]
impl Agent for SkillDrivenAgent {
    fn agent_id(&self) -> &str {
        &self.persona.agent_id
    }

    fn name(&self) -> &str {
        &self.persona.name
    }

    fn agent_type(&self) -> cortex_core::AgentType {
        self.persona.agent_type
    }

    fn capabilities(&self) -> Vec<cortex_core::AgentCapability> {
        self.persona.capabilities.clone()
    }

    async fn process(
        &self,
        envelope: MessageEnvelope,
    ) -> anyhow::Result<Option<MessageEnvelope>> {
        // Tracker lookup decides branch A; the payload of a specialist's
        // reply is arbitrary, so the reference code is the only reliable
        // correlator.
        if let Some(workflow) = self.workflows.find_by_subtask(&envelope.reference_code).await {
            return self.handle_subtask_reply(workflow, envelope).await;
        }
        if let Payload::PlanApproval(response) = &envelope.message {
            return self.handle_plan_approval(response.clone()).await;
        }
        self.handle_new_goal(envelope).await
    }
}

/// Pull the first parseable [`DecompositionResult`] out of the pipeline
/// outputs, in insertion order.
///
/// Tolerates the nested `{tasks, summary, confidence}` shape and the
/// legacy flat `{capability, authorityTier, summary, confidence}` shape
/// (treated as a one-task decomposition). Unstructured outputs are
/// skipped.
#[must_use]
pub fn extract_decomposition(context: &PipelineContext) -> Option<DecompositionResult> {
    context
        .results
        .iter()
        .filter_map(|(_, value)| value.as_ref())
        .find_map(parse_decomposition)
}

fn parse_decomposition(value: &serde_json::Value) -> Option<DecompositionResult> {
    let object = value.as_object()?;
    if object.contains_key("tasks") {
        let parsed: DecompositionResult = serde_json::from_value(value.clone()).ok()?;
        return Some(parsed);
    }
    if object.contains_key("capability") {
        // Legacy flat shape: one task whose description is the summary.
        let capability = object.get("capability")?.as_str()?.to_string();
        let summary = object
            .get("summary")
            .and_then(|s| s.as_str())
            .unwrap_or(&capability)
            .to_string();
        let authority_tier = object
            .get("authorityTier")
            .or_else(|| object.get("authority_tier"))
            .and_then(|t| t.as_str())
            .map(str::to_string);
        let confidence = object
            .get("confidence")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or_default();
        return Some(DecompositionResult {
            tasks: vec![TaskSpec {
                capability,
                description: summary.clone(),
                authority_tier,
            }],
            summary,
            confidence,
        });
    }
    None
}
