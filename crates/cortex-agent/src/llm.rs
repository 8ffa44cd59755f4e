// SPDX-License-Identifier: MIT OR Apache-2.0
//! LLM-backed skill execution.
//!
//! The executor builds a prompt from the skill definition plus the message
//! content and capability listing, invokes an [`LlmClient`], and parses the
//! first JSON object out of the response. Parse failures yield `None` —
//! the pipeline records an empty slot and downstream guards escalate.

use crate::pipeline::{
    PARAM_AVAILABLE_CAPABILITIES, PARAM_MESSAGE_CONTENT, SkillExecutor,
};
use async_trait::async_trait;
use cortex_core::SkillDefinition;
use serde_json::Value;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Executor type string LLM skills declare.
pub const LLM_EXECUTOR_TYPE: &str = "llm";

/// Completes prompts.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Produce a completion for the prompt.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Failures talking to the model.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The CLI process could not be spawned or piped.
    #[error("failed to run llm command {command:?}")]
    Process {
        /// The configured binary.
        command: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The process exceeded the configured timeout.
    #[error("llm command {command:?} timed out after {timeout:?}")]
    Timeout {
        /// The configured binary.
        command: String,
        /// The configured limit.
        timeout: Duration,
    },

    /// The process exited non-zero.
    #[error("llm command {command:?} exited with {status}: {stderr}")]
    NonZeroExit {
        /// The configured binary.
        command: String,
        /// The exit status.
        status: std::process::ExitStatus,
        /// Captured stderr, trimmed.
        stderr: String,
    },

    /// The process produced non-UTF-8 output.
    #[error("llm command {command:?} produced invalid utf-8")]
    InvalidOutput {
        /// The configured binary.
        command: String,
    },
}

/// Reference [`LlmClient`] that shells out to an external CLI in print
/// mode, piping the prompt to stdin and reading stdout.
pub struct CliLlmClient {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CliLlmClient {
    /// Client for the given binary and arguments with a 120 s timeout.
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            timeout: Duration::from_secs(120),
        }
    }

    /// Override the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl LlmClient for CliLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LlmError::Process {
                command: self.command.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|source| LlmError::Process {
                    command: self.command.clone(),
                    source,
                })?;
            // Close stdin so print-mode CLIs see end-of-input.
            drop(stdin);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| LlmError::Timeout {
                command: self.command.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| LlmError::Process {
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(LlmError::NonZeroExit {
                command: self.command.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| LlmError::InvalidOutput {
            command: self.command.clone(),
        })
    }
}

/// [`SkillExecutor`] that prompts an [`LlmClient`] and expects structured
/// JSON back.
pub struct LlmExecutor {
    client: Arc<dyn LlmClient>,
}

impl LlmExecutor {
    /// Executor over the given client.
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    fn build_prompt(definition: &SkillDefinition, parameters: &BTreeMap<String, Value>) -> String {
        let mut prompt = definition
            .content
            .clone()
            .unwrap_or_else(|| definition.description.clone());

        if let Some(Value::Array(capabilities)) = parameters.get(PARAM_AVAILABLE_CAPABILITIES)
            && !capabilities.is_empty()
        {
            prompt.push_str("\n\nAvailable capabilities:");
            for capability in capabilities {
                if let Value::String(line) = capability {
                    prompt.push_str("\n- ");
                    prompt.push_str(line);
                }
            }
        }

        if let Some(Value::String(content)) = parameters.get(PARAM_MESSAGE_CONTENT) {
            prompt.push_str("\n\nMessage:\n");
            prompt.push_str(content);
        }
        prompt
    }
}

#[async_trait]
impl SkillExecutor for LlmExecutor {
    fn executor_type(&self) -> &str {
        LLM_EXECUTOR_TYPE
    }

    async fn execute(
        &self,
        definition: &SkillDefinition,
        parameters: &BTreeMap<String, Value>,
    ) -> anyhow::Result<Option<Value>> {
        let prompt = Self::build_prompt(definition, parameters);
        let response = self.client.complete(&prompt).await?;
        let parsed = extract_first_json_object(&response);
        if parsed.is_none() {
            warn!(
                target: "cortex.agent",
                skill = %definition.skill_id,
                "llm response contained no parseable json object"
            );
        } else {
            debug!(target: "cortex.agent", skill = %definition.skill_id, "llm skill parsed");
        }
        Ok(parsed)
    }
}

/// Strip markdown code fences and parse the first JSON object in the text.
#[must_use]
pub fn extract_first_json_object(raw: &str) -> Option<Value> {
    let stripped: String = raw
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");

    let start = stripped.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in stripped[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &stripped[start..=start + offset];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}
