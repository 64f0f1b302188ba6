use common::storage::StorageError;
use sea_orm::DbErr;
use thiserror::Error;

/// Failures surfaced by variant and preview processing.
///
/// Reservation races are absorbed internally and never appear here; a
/// caller either wins the reservation or silently adopts the winner's
/// record.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Malformed or incomplete transformation parameters. Caller bug, not
    /// retried.
    #[error("invalid variation: {0}")]
    InvalidVariation(String),

    /// The source blob is neither image- nor video-like. No dispatch is
    /// attempted.
    #[error("unsupported source content type: {0}")]
    UnsupportedSource(String),

    /// The transform endpoint answered with a terminal non-accept status.
    /// Carries the raw response body for diagnosis.
    #[error("dispatch rejected with status {status}: {body}")]
    DispatchRejected { status: u16, body: String },

    /// Outcome unknown: the call or the completion wait timed out. Only
    /// raised when the caller did not opt into timeout tolerance.
    #[error("transform dispatch timed out")]
    DispatchTimedOut,

    /// The assembly pipeline reported an error terminal state.
    #[error("remote processing failed: {0}")]
    RemoteProcessingFailed(String),

    /// A row that must exist at this point does not (missing blob, missing
    /// output attachment).
    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("dispatch transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Database(#[from] DbErr),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}
