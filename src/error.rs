//! Error types.
//!
//! Two layers:
//! - [`SolverError`]: a solver backend failed to produce a readable answer.
//!   Never surfaced to callers of a solve; the adapter folds it into a
//!   `NotSolved` verdict.
//! - [`EngineError`]: everything a caller of the engine can see, from
//!   construction-time configuration mistakes to lifecycle conflicts.
//!
//! Validation findings are not errors; see [`crate::validation`].

use thiserror::Error;

use crate::solver::SolverKind;

/// Failure inside a solver backend.
#[derive(Error, Debug)]
pub enum SolverError {
    /// The solver executable could not be started.
    #[error("failed to launch {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The solver executable exited unsuccessfully.
    #[error("{command} exited with status {status}")]
    ExitStatus { command: String, status: String },

    /// The solution file was missing or did not parse.
    #[error("malformed solver output: {0}")]
    MalformedOutput(String),

    /// The in-process solver panicked or reported an internal error.
    #[error("solver internal error: {0}")]
    Internal(String),

    /// No backend is available for the requested solver kind.
    #[error("solver kind {0:?} is not supported by this backend")]
    Unsupported(SolverKind),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Engine-level error.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Inconsistent configuration or arguments detected while building a problem.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A referenced catalog entity or attempt does not exist.
    #[error("unknown {kind} '{id}'")]
    UnknownEntity { kind: &'static str, id: String },

    /// The attempt is not in a state that permits the requested action.
    #[error("attempt '{attempt_id}' cannot {action}: {reason}")]
    InvalidState {
        attempt_id: String,
        action: &'static str,
        reason: String,
    },

    /// Another attempt already holds the selected/deployed slot for this scope.
    #[error("attempt '{holder}' is already {flag} for this scope")]
    ScopeConflict { holder: String, flag: &'static str },

    /// The action is blocked because the attempt has validation errors.
    #[error("attempt '{attempt_id}' has {count} validation error(s)")]
    ValidationBlocked { attempt_id: String, count: usize },

    /// The solver verdict cannot be materialized.
    #[error("solver verdict is not usable: {0}")]
    UnusableVerdict(String),

    /// A writer panicked while holding an attempt lock.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn unknown(kind: &'static str, id: impl Into<String>) -> Self {
        Self::UnknownEntity {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn invalid_state(
        attempt_id: impl Into<String>,
        action: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            attempt_id: attempt_id.into(),
            action,
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type EngineResult<T> = Result<T, EngineError>;
