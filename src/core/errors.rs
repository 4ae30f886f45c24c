//! Shared error types for the engine.

use crate::core::ChangeStatus;
use thiserror::Error;

/// Main error type for mendmap operations.
///
/// Only `RollbackFailed` is unrecoverable: every other failure mode is
/// handled locally by rolling back to the nearest restore point and
/// recording the outcome in the session record.
#[derive(Debug, Error)]
pub enum EngineError {
    /// One or more blocking preflight checks failed; the session aborts
    /// before any mutation of that unit.
    #[error("preflight blocked for unit {unit}: {details}")]
    PreflightBlocked { unit: String, details: String },

    /// The edit itself could not be written.
    #[error("apply failed for unit {unit}: {message}")]
    ApplyFailed { unit: String, message: String },

    /// Post-apply structural or health-score check failed.
    #[error("verification failed for unit {unit}: {issues:?}")]
    VerificationFailed { unit: String, issues: Vec<String> },

    /// Apply or snapshot exceeded its per-unit bound.
    #[error("unit {unit} exceeded its {limit_secs}s bound after {elapsed_secs}s")]
    TimeoutExceeded {
        unit: String,
        elapsed_secs: u64,
        limit_secs: u64,
    },

    /// Admission control: another session is already active.
    #[error("another repair session is active")]
    ConcurrentSessionRejected,

    /// Restoration itself cannot be trusted; never retried.
    #[error("rollback to {restore_point} failed: {message}")]
    RollbackFailed {
        restore_point: String,
        message: String,
    },

    #[error("unknown restore point {0}")]
    UnknownRestorePoint(String),

    #[error("invalid status transition for unit {unit}: {from:?} -> {to:?}")]
    InvalidTransition {
        unit: String,
        from: ChangeStatus,
        to: ChangeStatus,
    },

    #[error("revision system error: {0}")]
    Revision(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("analysis error: {0}")]
    Analysis(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
}

impl EngineError {
    /// True when no further automated recovery is possible.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::RollbackFailed { .. })
    }
}
