//! Error taxonomy for document synchronization.

use thiserror::Error;

/// Errors raised while loading, saving or reconciling a document.
///
/// Errors are `Clone` so that one failure can be delivered both to the caller
/// waiting on a flush and to the session's event stream.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// The backend could not be reached, or answered with a server error.
    #[error("Network failure: {0}")]
    NetworkFailure(String),
    /// The asset store refused an upload.
    #[error("Upload rejected: {0}")]
    UploadRejected(String),
    /// A payload could not be parsed or produced.
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),
    /// A save finished after a remote replace had already won.
    #[error("Stale write dropped: {0}")]
    StaleWriteRace(String),
    /// The backend has no such document or asset.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The session was disposed before the operation could finish.
    #[error("Session disposed")]
    Disposed,
}

impl SyncError {
    /// Whether a later attempt may succeed without intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::NetworkFailure(_))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailure(err.to_string())
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
