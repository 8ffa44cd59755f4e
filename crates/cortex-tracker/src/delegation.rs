// SPDX-License-Identifier: MIT OR Apache-2.0
//! Delegation records and retry counting.

use chrono::{DateTime, Utc};
use cortex_core::{DelegationRecord, DelegationStatus, ReferenceCode};
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use tracing::debug;

/// Concurrent store of [`DelegationRecord`]s keyed by reference code.
///
/// Records are immutable; [`update_status`](Self::update_status) stores a
/// replacement. Overdue is a computed view over `due_at`, not a stored
/// state.
#[derive(Debug, Default)]
pub struct DelegationTracker {
    records: RwLock<HashMap<String, DelegationRecord>>,
}

impl DelegationTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record.
    pub fn record(&self, record: DelegationRecord) {
        debug!(
            target: "cortex.tracker",
            reference = %record.reference_code,
            delegated_to = %record.delegated_to,
            "delegation recorded"
        );
        self.records
            .write()
            .expect("delegation store poisoned")
            .insert(record.reference_code.as_str().to_string(), record);
    }

    /// Look up a record.
    #[must_use]
    pub fn get(&self, reference: &ReferenceCode) -> Option<DelegationRecord> {
        self.records
            .read()
            .expect("delegation store poisoned")
            .get(reference.as_str())
            .cloned()
    }

    /// Records assigned to the given agent, ordered by reference code.
    #[must_use]
    pub fn by_assignee(&self, agent_id: &str) -> Vec<DelegationRecord> {
        let records = self.records.read().expect("delegation store poisoned");
        let mut matches: Vec<DelegationRecord> = records
            .values()
            .filter(|r| r.delegated_to == agent_id)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.reference_code.cmp(&b.reference_code));
        matches
    }

    /// Records whose deadline has passed and which are not complete,
    /// evaluated against `now`.
    #[must_use]
    pub fn overdue_at(&self, now: DateTime<Utc>) -> Vec<DelegationRecord> {
        let records = self.records.read().expect("delegation store poisoned");
        let mut matches: Vec<DelegationRecord> = records
            .values()
            .filter(|r| {
                r.status != DelegationStatus::Complete && r.due_at.is_some_and(|due| due < now)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.reference_code.cmp(&b.reference_code));
        matches
    }

    /// Records overdue right now.
    #[must_use]
    pub fn overdue(&self) -> Vec<DelegationRecord> {
        self.overdue_at(Utc::now())
    }

    /// Replace a record with its status updated, returning the
    /// replacement. Unknown references return `None`.
    pub fn update_status(
        &self,
        reference: &ReferenceCode,
        status: DelegationStatus,
    ) -> Option<DelegationRecord> {
        let mut records = self.records.write().expect("delegation store poisoned");
        let current = records.get(reference.as_str())?;
        let updated = current.with_status(status);
        records.insert(reference.as_str().to_string(), updated.clone());
        Some(updated)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().expect("delegation store poisoned").len()
    }

    /// `true` when no delegation is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Atomic per-reference retry counts for the supervision service.
#[derive(Debug, Default)]
pub struct RetryCounter {
    counts: Mutex<HashMap<String, u32>>,
}

impl RetryCounter {
    /// Empty counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment and return the new count.
    pub fn increment(&self, reference: &ReferenceCode) -> u32 {
        let mut counts = self.counts.lock().expect("retry counter poisoned");
        let count = counts.entry(reference.as_str().to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Current count without incrementing.
    #[must_use]
    pub fn get(&self, reference: &ReferenceCode) -> u32 {
        self.counts
            .lock()
            .expect("retry counter poisoned")
            .get(reference.as_str())
            .copied()
            .unwrap_or(0)
    }

    /// Remove the entry for a reference.
    pub fn reset(&self, reference: &ReferenceCode) {
        self.counts
            .lock()
            .expect("retry counter poisoned")
            .remove(reference.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn code(n: u32) -> ReferenceCode {
        format!("CTX-2026-0801-{n:03}").parse().unwrap()
    }

    fn delegation(n: u32, to: &str) -> DelegationRecord {
        DelegationRecord::assigned(code(n), "cos", to, "some work")
    }

    #[test]
    fn by_assignee_filters_on_delegated_to() {
        let tracker = DelegationTracker::new();
        tracker.record(delegation(1, "analyst"));
        tracker.record(delegation(2, "writer"));
        tracker.record(delegation(3, "analyst"));
        let mine = tracker.by_assignee("analyst");
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|r| r.delegated_to == "analyst"));
    }

    #[test]
    fn overdue_requires_a_past_deadline() {
        let tracker = DelegationTracker::new();
        let now = Utc::now();
        tracker.record(delegation(1, "analyst").due_at(now - Duration::hours(1)));
        tracker.record(delegation(2, "analyst").due_at(now + Duration::hours(1)));
        tracker.record(delegation(3, "analyst")); // no deadline
        let overdue = tracker.overdue_at(now);
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].reference_code, code(1));
    }

    #[test]
    fn completed_delegations_are_never_overdue() {
        let tracker = DelegationTracker::new();
        let now = Utc::now();
        tracker.record(delegation(1, "analyst").due_at(now - Duration::hours(1)));
        tracker.update_status(&code(1), DelegationStatus::Complete);
        assert!(tracker.overdue_at(now).is_empty());
    }

    #[test]
    fn update_status_replaces_the_record() {
        let tracker = DelegationTracker::new();
        tracker.record(delegation(1, "analyst"));
        let updated = tracker
            .update_status(&code(1), DelegationStatus::InProgress)
            .unwrap();
        assert_eq!(updated.status, DelegationStatus::InProgress);
        assert_eq!(
            tracker.get(&code(1)).unwrap().status,
            DelegationStatus::InProgress
        );
    }

    #[test]
    fn update_status_on_unknown_reference_returns_none() {
        let tracker = DelegationTracker::new();
        assert!(tracker.update_status(&code(9), DelegationStatus::Complete).is_none());
    }

    #[test]
    fn retry_counter_increments_atomically() {
        let counter = RetryCounter::new();
        assert_eq!(counter.increment(&code(1)), 1);
        assert_eq!(counter.increment(&code(1)), 2);
        assert_eq!(counter.increment(&code(2)), 1);
        assert_eq!(counter.get(&code(1)), 2);
    }

    #[test]
    fn retry_counter_reset_removes_the_entry() {
        let counter = RetryCounter::new();
        counter.increment(&code(1));
        counter.reset(&code(1));
        assert_eq!(counter.get(&code(1)), 0);
        assert_eq!(counter.increment(&code(1)), 1);
    }
}
