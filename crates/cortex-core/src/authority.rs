// SPDX-License-Identifier: MIT OR Apache-2.0
//! Authority tiers and claims.
//!
//! Tiers are totally ordered; a claim grants an agent a tier for a set of
//! actions, optionally until an expiry instant.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Sentinel action meaning "every action".
pub const WILDCARD_ACTION: &str = "*";

/// Ordered authority levels.
///
/// `JustDoIt < DoItAndShowMe < AskMeFirst` — a higher tier demands more
/// oversight from the granter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityTier {
    /// Act without reporting back.
    JustDoIt,
    /// Act, then show the result.
    DoItAndShowMe,
    /// Obtain approval before acting.
    AskMeFirst,
}

impl AuthorityTier {
    /// Parse a tier leniently, falling back to [`AuthorityTier::JustDoIt`]
    /// when the input is absent or unrecognised.
    #[must_use]
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.parse().ok())
            .unwrap_or(AuthorityTier::JustDoIt)
    }
}

impl fmt::Display for AuthorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::JustDoIt => "JustDoIt",
            Self::DoItAndShowMe => "DoItAndShowMe",
            Self::AskMeFirst => "AskMeFirst",
        };
        f.write_str(s)
    }
}

impl FromStr for AuthorityTier {
    type Err = CoreError;

    /// Accepts canonical (`DoItAndShowMe`) and snake_case (`do_it_and_show_me`)
    /// spellings, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalised.as_str() {
            "justdoit" => Ok(Self::JustDoIt),
            "doitandshowme" => Ok(Self::DoItAndShowMe),
            "askmefirst" => Ok(Self::AskMeFirst),
            _ => Err(CoreError::UnknownTier {
                value: s.to_string(),
            }),
        }
    }
}

/// A grant of authority carried with a message or held by the authority
/// provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AuthorityClaim {
    /// Agent that issued the grant.
    pub granted_by: String,
    /// Agent the grant applies to.
    pub granted_to: String,
    /// Authority level of the grant.
    pub tier: AuthorityTier,
    /// Actions the grant covers. Empty means every action.
    pub permitted_actions: BTreeSet<String>,
    /// When the grant was issued.
    pub granted_at: DateTime<Utc>,
    /// Optional expiry instant; absent grants never expire.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthorityClaim {
    /// Build a non-expiring claim covering every action.
    #[must_use]
    pub fn new(
        granted_by: impl Into<String>,
        granted_to: impl Into<String>,
        tier: AuthorityTier,
    ) -> Self {
        Self {
            granted_by: granted_by.into(),
            granted_to: granted_to.into(),
            tier,
            permitted_actions: BTreeSet::new(),
            granted_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Restrict the claim to the given actions.
    #[must_use]
    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permitted_actions = actions.into_iter().map(Into::into).collect();
        self
    }

    /// Set an expiry instant.
    #[must_use]
    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// `true` when the claim has an expiry in the past relative to `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }

    /// `true` when the claim has an expiry in the past.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// `true` when the given action falls under this claim's action set.
    ///
    /// An empty set and the `*` sentinel both cover every action.
    #[must_use]
    pub fn covers_action(&self, action: &str) -> bool {
        self.permitted_actions.is_empty()
            || self.permitted_actions.contains(WILDCARD_ACTION)
            || self.permitted_actions.contains(action)
    }

    /// `true` when this claim authorises `agent` to perform `action` now.
    #[must_use]
    pub fn applies_to(&self, agent: &str, action: &str) -> bool {
        self.granted_to == agent && self.covers_action(action) && !self.is_expired()
    }
}
