// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! cortex-agent
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// LLM-backed skill execution and the CLI client.
pub mod llm;
/// Persona configuration.
pub mod persona;
/// The skill pipeline runner and executor contract.
pub mod pipeline;
/// The skill-driven agent.
pub mod skill_agent;

pub use llm::{CliLlmClient, LLM_EXECUTOR_TYPE, LlmClient, LlmError, LlmExecutor};
pub use persona::PersonaDefinition;
pub use pipeline::{PipelineContext, SkillExecutor, SkillPipelineRunner};
pub use skill_agent::{SkillDrivenAgent, extract_decomposition};
