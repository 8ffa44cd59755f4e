// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reference codes — the stable, human-readable identity of a workflow or
//! sub-task.
//!
//! Canonical form is `CTX-YYYY-MMDD-NNN` where `NNN` is a per-day sequence.
//! Codes are opaque once constructed; equality is string equality.

use crate::error::CoreError;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

/// Highest per-day sequence value the three-digit encoding can carry.
const MAX_SEQUENCE: u32 = 999;

/// Opaque identity for a unit of work.
///
/// # Examples
///
/// ```
/// use cortex_core::ReferenceCode;
///
/// let code: ReferenceCode = "CTX-2026-0801-001".parse().unwrap();
/// assert_eq!(code.as_str(), "CTX-2026-0801-001");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "String", into = "String")]
pub struct ReferenceCode(String);

impl ReferenceCode {
    /// Validate and wrap a canonical reference code string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidReferenceCode`] when the value does not
    /// match `CTX-\d{4}-\d{4}-\d{3}`.
    pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
        let value = value.into();
        if !is_canonical(&value) {
            return Err(CoreError::InvalidReferenceCode { value });
        }
        Ok(Self(value))
    }

    /// The canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferenceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ReferenceCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ReferenceCode {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ReferenceCode> for String {
    fn from(code: ReferenceCode) -> Self {
        code.0
    }
}

/// Structural check for `CTX-\d{4}-\d{4}-\d{3}`.
fn is_canonical(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 17 || &bytes[..4] != b"CTX-" {
        return false;
    }
    let digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);
    digits(4..8) && bytes[8] == b'-' && digits(9..13) && bytes[13] == b'-' && digits(14..17)
}

/// Clock used by [`ReferenceCodeGenerator`]; injectable for tests.
type DateFn = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Produces fresh [`ReferenceCode`]s with a monotonically increasing
/// per-day sequence.
///
/// Sequences reset at midnight UTC. The sequence store is serialised behind
/// a single lock so two concurrent calls never yield the same code.
pub struct ReferenceCodeGenerator {
    sequences: Mutex<HashMap<NaiveDate, u32>>,
    clock: DateFn,
}

impl ReferenceCodeGenerator {
    /// Create a generator using the system UTC clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Utc::now)
    }

    /// Create a generator with an injected clock.
    pub fn with_clock(clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        Self {
            sequences: Mutex::new(HashMap::new()),
            clock: Box::new(clock),
        }
    }

    /// Allocate the next code for today.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SequenceExhausted`] once a day's sequence would
    /// exceed the three-digit encoding width.
    pub fn generate(&self) -> Result<ReferenceCode, CoreError> {
        let now = (self.clock)();
        let date = now.date_naive();
        let mut sequences = self.sequences.lock().expect("sequence store poisoned");
        let slot = sequences.entry(date).or_insert(0);
        if *slot >= MAX_SEQUENCE {
            return Err(CoreError::SequenceExhausted { date });
        }
        *slot += 1;
        let code = format!(
            "CTX-{:04}-{:02}{:02}-{:03}",
            date.year(),
            date.month(),
            date.day(),
            *slot
        );
        Ok(ReferenceCode(code))
    }
}

impl Default for ReferenceCodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReferenceCodeGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceCodeGenerator").finish_non_exhaustive()
    }
}
