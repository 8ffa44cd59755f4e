// SPDX-License-Identifier: MIT OR Apache-2.0
//! Plans parked behind the AskMeFirst gate.

use cortex_core::{PendingPlan, ReferenceCode};
use std::collections::HashMap;
use std::sync::RwLock;

/// Concurrent store of [`PendingPlan`]s keyed by workflow reference code.
#[derive(Debug, Default)]
pub struct PendingPlanStore {
    plans: RwLock<HashMap<String, PendingPlan>>,
}

impl PendingPlanStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a plan under its workflow reference code.
    pub fn store(&self, reference: &ReferenceCode, plan: PendingPlan) {
        self.plans
            .write()
            .expect("pending plan store poisoned")
            .insert(reference.as_str().to_string(), plan);
    }

    /// Remove and return the plan for a reference code.
    pub fn take(&self, reference: &ReferenceCode) -> Option<PendingPlan> {
        self.plans
            .write()
            .expect("pending plan store poisoned")
            .remove(reference.as_str())
    }

    /// Number of parked plans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plans.read().expect("pending plan store poisoned").len()
    }

    /// `true` when no plan is parked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
