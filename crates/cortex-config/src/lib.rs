// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! cortex-config
#![deny(unsafe_code)]
#![warn(missing_docs)]

use cortex_runtime::SupervisionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Errors & warnings
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file could not be read.
    #[error("config file not readable: {path}")]
    Unreadable {
        /// Path that was requested.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {reason}")]
    Parse {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed.
    #[error("config validation failed: {reasons:?}")]
    Validation {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

/// Advisory issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// The supervision interval is short enough to be noisy.
    ShortSupervisionInterval {
        /// Configured seconds.
        secs: u64,
    },
    /// The LLM timeout is unusually large.
    LargeLlmTimeout {
        /// Configured seconds.
        secs: u64,
    },
    /// No persona files are configured; only hand-wired agents will run.
    NoPersonas,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Message bus settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusSettings {
    /// Optional per-queue depth cap; absent means unbounded.
    pub queue_capacity: Option<usize>,
}

/// LLM CLI settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Binary to spawn.
    pub command: String,
    /// Arguments putting the binary in print mode.
    pub args: Vec<String>,
    /// Per-completion timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            args: vec!["-p".to_string()],
            timeout_secs: 120,
        }
    }
}

/// Top-level runtime settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CortexConfig {
    /// Bus settings.
    #[serde(default)]
    pub bus: BusSettings,
    /// Supervision timing and targets.
    #[serde(default)]
    pub supervision: SupervisionConfig,
    /// LLM CLI settings.
    #[serde(default)]
    pub llm: LlmSettings,
    /// Persona definition files to load at startup.
    #[serde(default)]
    pub personas: Vec<PathBuf>,
}

impl CortexConfig {
    /// Load and parse a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Unreadable`] or [`ConfigError::Parse`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Semantic validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] listing every hard problem;
    /// `Ok` carries advisory warnings.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        let mut reasons = Vec::new();
        let mut warnings = Vec::new();

        if self.supervision.check_interval_secs == 0 {
            reasons.push("supervision.check_interval_secs must be non-zero".to_string());
        } else if self.supervision.check_interval_secs < 5 {
            warnings.push(ConfigWarning::ShortSupervisionInterval {
                secs: self.supervision.check_interval_secs,
            });
        }
        if self.supervision.alert_target.is_empty() {
            reasons.push("supervision.alert_target must not be empty".to_string());
        }
        if self.supervision.escalation_target.is_empty() {
            reasons.push("supervision.escalation_target must not be empty".to_string());
        }
        if self.llm.command.is_empty() {
            reasons.push("llm.command must not be empty".to_string());
        }
        if self.llm.timeout_secs == 0 {
            reasons.push("llm.timeout_secs must be non-zero".to_string());
        } else if self.llm.timeout_secs > 600 {
            warnings.push(ConfigWarning::LargeLlmTimeout {
                secs: self.llm.timeout_secs,
            });
        }
        if let Some(0) = self.bus.queue_capacity {
            reasons.push("bus.queue_capacity must be non-zero when set".to_string());
        }
        if self.personas.is_empty() {
            warnings.push(ConfigWarning::NoPersonas);
        }

        if reasons.is_empty() {
            Ok(warnings)
        } else {
            Err(ConfigError::Validation { reasons })
        }
    }
}
