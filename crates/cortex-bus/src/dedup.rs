// SPDX-License-Identifier: MIT OR Apache-2.0
//! Seen-message store.
//!
//! The bus guarantees at-most-once per consumer in the happy path and
//! at-least-once under broker redelivery; handlers whose effects must not
//! repeat consult this store before acting.

use std::collections::HashSet;
use std::sync::RwLock;

/// Concurrent set of already-seen message ids.
#[derive(Debug, Default)]
pub struct DedupStore {
    seen: RwLock<HashSet<String>>,
}

impl DedupStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message id. Returns `true` the first time an id is seen
    /// and `false` on every repeat; repeated calls leave the store
    /// unchanged.
    pub fn mark_seen(&self, message_id: &str) -> bool {
        self.seen
            .write()
            .expect("dedup store poisoned")
            .insert(message_id.to_string())
    }

    /// `true` when the id has been recorded.
    #[must_use]
    pub fn is_seen(&self, message_id: &str) -> bool {
        self.seen
            .read()
            .expect("dedup store poisoned")
            .contains(message_id)
    }

    /// Number of recorded ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.read().expect("dedup store poisoned").len()
    }

    /// `true` when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
