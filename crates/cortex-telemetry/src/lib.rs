// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! cortex-telemetry
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber, reading `RUST_LOG` and
/// defaulting the `cortex` targets to `info`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn try_init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cortex=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Counters the runtime increments as messages flow.
#[derive(Debug, Default)]
pub struct RuntimeCounters {
    messages_processed: AtomicU64,
    replies_routed: AtomicU64,
    workflows_completed: AtomicU64,
    escalations: AtomicU64,
}

/// Point-in-time view of [`RuntimeCounters`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountersSnapshot {
    /// Envelopes handed to agents.
    pub messages_processed: u64,
    /// Replies republished by harnesses.
    pub replies_routed: u64,
    /// Workflows that reached completion.
    pub workflows_completed: u64,
    /// Goals forwarded to an escalation target.
    pub escalations: u64,
}

impl RuntimeCounters {
    /// Fresh zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one processed message.
    pub fn message_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one routed reply.
    pub fn reply_routed(&self) {
        self.replies_routed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one completed workflow.
    pub fn workflow_completed(&self) {
        self.workflows_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one escalation.
    pub fn escalation(&self) {
        self.escalations.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters.
    #[must_use]
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            replies_routed: self.replies_routed.load(Ordering::Relaxed),
            workflows_completed: self.workflows_completed.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
        }
    }
}
