// SPDX-License-Identifier: MIT OR Apache-2.0
//! Parent/child workflow correlation and completion detection.

use async_trait::async_trait;
use chrono::Utc;
use cortex_core::{MessageEnvelope, ReferenceCode, WorkflowRecord, WorkflowStatus};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::debug;

/// Correlates sub-task results back to their parent workflow.
///
/// A reply envelope's payload is arbitrary, so reference-code lookup via
/// [`find_by_subtask`](Self::find_by_subtask) is the only reliable
/// correlator for the aggregation path.
#[async_trait]
pub trait WorkflowTracker: Send + Sync {
    /// Record a new workflow and index its sub-task codes.
    async fn create(&self, record: WorkflowRecord);

    /// The workflow a sub-task code belongs to, if any.
    ///
    /// Parent codes are not in the reverse index; passing one returns
    /// `None`.
    async fn find_by_subtask(&self, subtask: &ReferenceCode) -> Option<WorkflowRecord>;

    /// Store a sub-task's result envelope. Returns `false` when the code
    /// is not indexed.
    async fn store_result(&self, subtask: &ReferenceCode, envelope: MessageEnvelope) -> bool;

    /// `true` when every sub-task of the workflow has a stored result.
    async fn all_subtasks_complete(&self, parent: &ReferenceCode) -> bool;

    /// Stored results in sub-task-reference order. Incomplete workflows
    /// yield only the results present so far.
    async fn completed_results(
        &self,
        parent: &ReferenceCode,
    ) -> Vec<(ReferenceCode, MessageEnvelope)>;

    /// Replace the workflow record with the status updated, stamping
    /// `completed_at` on terminal transitions. Returns `false` when the
    /// parent is unknown.
    async fn set_status(&self, parent: &ReferenceCode, status: WorkflowStatus) -> bool;

    /// Current record for a parent code.
    async fn get(&self, parent: &ReferenceCode) -> Option<WorkflowRecord>;
}

struct WorkflowState {
    record: WorkflowRecord,
    results: HashMap<String, MessageEnvelope>,
}

/// In-memory [`WorkflowTracker`].
///
/// A concurrent map of per-workflow states plus a reverse index from
/// sub-task codes to parents. Each operation is a single critical section
/// under that workflow's lock.
#[derive(Default)]
pub struct InMemoryWorkflowTracker {
    workflows: RwLock<HashMap<String, Arc<Mutex<WorkflowState>>>>,
    by_subtask: RwLock<HashMap<String, String>>,
}

impl InMemoryWorkflowTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state_for_parent(&self, parent: &ReferenceCode) -> Option<Arc<Mutex<WorkflowState>>> {
        self.workflows
            .read()
            .expect("workflow map poisoned")
            .get(parent.as_str())
            .cloned()
    }

    fn state_for_subtask(&self, subtask: &ReferenceCode) -> Option<Arc<Mutex<WorkflowState>>> {
        let parent = self
            .by_subtask
            .read()
            .expect("subtask index poisoned")
            .get(subtask.as_str())
            .cloned()?;
        self.workflows
            .read()
            .expect("workflow map poisoned")
            .get(&parent)
            .cloned()
    }
}

#[async_trait]
impl WorkflowTracker for InMemoryWorkflowTracker {
    async fn create(&self, record: WorkflowRecord) {
        debug!(
            target: "cortex.tracker",
            reference = %record.reference_code,
            subtasks = record.subtask_reference_codes.len(),
            "workflow created"
        );
        {
            let mut index = self.by_subtask.write().expect("subtask index poisoned");
            for subtask in &record.subtask_reference_codes {
                index.insert(
                    subtask.as_str().to_string(),
                    record.reference_code.as_str().to_string(),
                );
            }
        }
        let key = record.reference_code.as_str().to_string();
        let state = Arc::new(Mutex::new(WorkflowState {
            record,
            results: HashMap::new(),
        }));
        self.workflows
            .write()
            .expect("workflow map poisoned")
            .insert(key, state);
    }

    async fn find_by_subtask(&self, subtask: &ReferenceCode) -> Option<WorkflowRecord> {
        let state = self.state_for_subtask(subtask)?;
        let guard = state.lock().await;
        Some(guard.record.clone())
    }

    async fn store_result(&self, subtask: &ReferenceCode, envelope: MessageEnvelope) -> bool {
        let Some(state) = self.state_for_subtask(subtask) else {
            return false;
        };
        let mut guard = state.lock().await;
        guard.results.insert(subtask.as_str().to_string(), envelope);
        true
    }

    async fn all_subtasks_complete(&self, parent: &ReferenceCode) -> bool {
        let Some(state) = self.state_for_parent(parent) else {
            return false;
        };
        let guard = state.lock().await;
        guard
            .record
            .subtask_reference_codes
            .iter()
            .all(|code| guard.results.contains_key(code.as_str()))
    }

    async fn completed_results(
        &self,
        parent: &ReferenceCode,
    ) -> Vec<(ReferenceCode, MessageEnvelope)> {
        let Some(state) = self.state_for_parent(parent) else {
            return Vec::new();
        };
        let guard = state.lock().await;
        guard
            .record
            .subtask_reference_codes
            .iter()
            .filter_map(|code| {
                guard
                    .results
                    .get(code.as_str())
                    .map(|envelope| (code.clone(), envelope.clone()))
            })
            .collect()
    }

    async fn set_status(&self, parent: &ReferenceCode, status: WorkflowStatus) -> bool {
        let Some(state) = self.state_for_parent(parent) else {
            return false;
        };
        let mut guard = state.lock().await;
        let mut record = guard.record.clone();
        record.status = status;
        if matches!(status, WorkflowStatus::Completed | WorkflowStatus::Failed)
            && record.completed_at.is_none()
        {
            record.completed_at = Some(Utc::now());
        }
        guard.record = record;
        true
    }

    async fn get(&self, parent: &ReferenceCode) -> Option<WorkflowRecord> {
        let state = self.state_for_parent(parent)?;
        let guard = state.lock().await;
        Some(guard.record.clone())
    }
}

/// Tracker that answers "no workflow, nothing complete" and drops writes.
///
/// Injecting this where no tracker is wanted makes the aggregation branch
/// of the skill-driven agent inert.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWorkflowTracker;

#[async_trait]
impl WorkflowTracker for NullWorkflowTracker {
    async fn create(&self, _record: WorkflowRecord) {}

    async fn find_by_subtask(&self, _subtask: &ReferenceCode) -> Option<WorkflowRecord> {
        None
    }

    async fn store_result(&self, _subtask: &ReferenceCode, _envelope: MessageEnvelope) -> bool {
        false
    }

    async fn all_subtasks_complete(&self, _parent: &ReferenceCode) -> bool {
        false
    }

    async fn completed_results(
        &self,
        _parent: &ReferenceCode,
    ) -> Vec<(ReferenceCode, MessageEnvelope)> {
        Vec::new()
    }

    async fn set_status(&self, _parent: &ReferenceCode, _status: WorkflowStatus) -> bool {
        false
    }

    async fn get(&self, _parent: &ReferenceCode) -> Option<WorkflowRecord> {
        None
    }
}
