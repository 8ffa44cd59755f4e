// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! cortex-authority
#![deny(unsafe_code)]
#![warn(missing_docs)]

use cortex_core::{AuthorityClaim, AuthorityTier, WILDCARD_ACTION};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Concurrent store of authority grants keyed by `(agent, action)`.
///
/// A grant whose claim enumerates no actions is indexed under the `*`
/// sentinel and answers for every action. Expired entries are purged
/// opportunistically when a lookup touches them.
#[derive(Debug, Default)]
pub struct AuthorityProvider {
    grants: RwLock<HashMap<(String, String), AuthorityClaim>>,
}

impl AuthorityProvider {
    /// Empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a claim under every permitted action, or under the wildcard
    /// when the claim enumerates none. Granting the same claim twice
    /// leaves the store equivalent to a single grant.
    pub fn grant(&self, claim: AuthorityClaim) {
        let mut grants = self.grants.write().expect("authority store poisoned");
        if claim.permitted_actions.is_empty() {
            grants.insert(
                (claim.granted_to.clone(), WILDCARD_ACTION.to_string()),
                claim,
            );
        } else {
            for action in claim.permitted_actions.clone() {
                grants.insert((claim.granted_to.clone(), action), claim.clone());
            }
        }
    }

    /// The claim covering `(agent, action)`, falling back to the agent's
    /// wildcard grant. Expired entries are removed and `None` is returned.
    pub fn get_claim(&self, agent_id: &str, action: &str) -> Option<AuthorityClaim> {
        let mut grants = self.grants.write().expect("authority store poisoned");
        for key in [
            (agent_id.to_string(), action.to_string()),
            (agent_id.to_string(), WILDCARD_ACTION.to_string()),
        ] {
            if let Some(claim) = grants.get(&key) {
                if claim.is_expired() {
                    debug!(
                        target: "cortex.authority",
                        agent = %agent_id,
                        action = %key.1,
                        "purging expired grant"
                    );
                    grants.remove(&key);
                    continue;
                }
                return Some(claim.clone());
            }
        }
        None
    }

    /// `true` when the agent holds an applicable, unexpired grant at or
    /// above `min_tier` for the action.
    pub fn has_authority(&self, agent_id: &str, action: &str, min_tier: AuthorityTier) -> bool {
        self.get_claim(agent_id, action)
            .is_some_and(|claim| claim.tier >= min_tier)
    }

    /// Remove the specific `(agent, action)` entry. Wildcard grants are
    /// untouched unless `action` is the wildcard itself.
    pub fn revoke(&self, agent_id: &str, action: &str) {
        self.grants
            .write()
            .expect("authority store poisoned")
            .remove(&(agent_id.to_string(), action.to_string()));
    }

    /// Number of indexed grant entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.read().expect("authority store poisoned").len()
    }

    /// `true` when nothing is granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
