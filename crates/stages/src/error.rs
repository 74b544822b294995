//! Stage-level error type.

use thiserror::Error;

/// Errors returned by a stage's `execute` method.
///
/// The engine uses the variant to decide retry behaviour:
/// - `Retryable` — the stage is run again with exponential back-off.
/// - `Fatal`     — the run is aborted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StageError {
    /// Transient failure; the engine should re-try the stage.
    #[error("retryable stage error: {0}")]
    Retryable(String),

    /// Permanent failure; no retry should be attempted.
    #[error("fatal stage error: {0}")]
    Fatal(String),
}
