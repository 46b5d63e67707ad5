//! Error types for the salvage core library.

/// Top-level error enum for the salvage core library.
///
/// Only true infrastructure failures surface as errors: an unusable input,
/// a workspace that cannot be allocated, or an explicit cancellation.
/// Analysis-level problems (parse degradation, missing history, harness
/// crashes) degrade into diagnostics on the output values instead.
#[derive(Debug, thiserror::Error)]
pub enum SalvageError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Recovery session cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SalvageResult<T> = Result<T, SalvageError>;

/// Error raised by a version-history backend.
///
/// Never fatal for a recovery session: the session downgrades it to a
/// `HistoryUnavailable` warning and falls back to history-less recovery.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("History backend unreachable: {0}")]
    Unreachable(String),

    #[error("Artifact has no history: {0}")]
    NoHistory(String),

    #[error("Revision could not be fetched: {0}")]
    FetchFailed(String),

    #[error("Invalid revision reference: {0}")]
    InvalidReference(String),
}

/// Error raised by a test harness execution.
///
/// Downgrades the equivalence verdict to `Inconclusive`; never aborts the
/// reconstruction itself.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Harness timed out after {0} ms")]
    Timeout(u64),

    #[error("Harness crashed: {0}")]
    Crash(String),

    #[error("Harness could not execute artifact: {0}")]
    Unrunnable(String),
}
