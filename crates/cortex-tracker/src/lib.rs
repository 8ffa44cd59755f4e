// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! cortex-tracker
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Delegation records and retry counting.
pub mod delegation;
/// Plans parked behind the AskMeFirst gate.
pub mod pending;
/// Workflow correlation and completion detection.
pub mod workflow;

pub use delegation::{DelegationTracker, RetryCounter};
pub use pending::PendingPlanStore;
pub use workflow::{InMemoryWorkflowTracker, NullWorkflowTracker, WorkflowTracker};
