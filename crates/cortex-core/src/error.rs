// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error taxonomy for the core contract.
//!
//! Validation errors are raised at construction or parse time and surfaced
//! to the caller; capacity errors are rare enough to treat as fatal.

use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised by contract-type construction and parsing.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The value does not match the canonical `CTX-YYYY-MMDD-NNN` form.
    #[error("invalid reference code: {value:?}")]
    InvalidReferenceCode {
        /// The rejected input.
        value: String,
    },

    /// An authority tier string could not be parsed.
    #[error("unknown authority tier: {value:?}")]
    UnknownTier {
        /// The rejected input.
        value: String,
    },

    /// A day's reference-code sequence exceeded the encoding width.
    #[error("reference code sequence exhausted for {date}")]
    SequenceExhausted {
        /// The UTC date whose sequence ran out.
        date: NaiveDate,
    },

    /// A payload kind tag did not resolve to a concrete payload type.
    #[error("unknown payload kind: {kind:?}")]
    UnknownPayloadKind {
        /// The unresolved kind tag.
        kind: String,
    },

    /// A payload body failed to decode as the type its kind tag names.
    #[error("payload decode failed for kind {kind:?}")]
    PayloadDecode {
        /// The kind tag whose body failed to decode.
        kind: String,
        /// Decode failure detail.
        #[source]
        source: serde_json::Error,
    },
}
