//! Error taxonomy shared across the workspace (§7 of the design).
//!
//! Every crate in the workspace either reuses this enum directly or wraps
//! it with `#[from]`, the same way the teacher's dependent crates reuse
//! `agenticlaw_core::Error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// I/O, timeout, or other backoff-eligible failure. Retried up to three
    /// times with exponential backoff before surfacing (see `retry`).
    #[error("transient failure: {detail}")]
    Transient { detail: String },

    /// A data contract was broken (out-of-range event in a window, cyclic
    /// lineage, ...). The offending item is discarded and processing
    /// continues.
    #[error("invariant violation: {detail}")]
    InvariantViolation { detail: String },

    /// Invalid configuration. Fatal at startup, non-fatal (logged, defaults
    /// restored) at runtime — callers decide which based on context.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Incoming event or feedback failed schema validation. Dropped with a
    /// metric increment by the caller.
    #[error("validation error: {0}")]
    Validation(String),

    /// Insufficient data for a learning step (below batch size). Not a
    /// real error — callers should treat this as an informational outcome.
    #[error("adaptation stalled: {reason}")]
    AdaptationStalled { reason: String },

    /// The persistence store could not be reached. The engine degrades to
    /// in-memory-only mode and continues serving reads from cache.
    #[error("persistence unavailable: {detail}")]
    PersistenceUnavailable { detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn transient(detail: impl Into<String>) -> Self {
        Self::Transient { detail: detail.into() }
    }

    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::InvariantViolation { detail: detail.into() }
    }

    pub fn stalled(reason: impl Into<String>) -> Self {
        Self::AdaptationStalled { reason: reason.into() }
    }

    /// Process exit code per the CLI surface contract in §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Transient { .. } => 1,
            Error::InvariantViolation { .. } => 2,
            Error::Configuration(_) => 3,
            Error::AdaptationStalled { .. } => 0,
            Error::Validation(_) => 1,
            Error::PersistenceUnavailable { .. } => 1,
            Error::Io(_) | Error::Json(_) => 1,
        }
    }
}
