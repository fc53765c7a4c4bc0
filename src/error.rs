//! Error types shared by the ingestion pipeline and its backends.
//!
//! Library boundaries return [`IngestResult`]. The binary glue (config
//! loading, migrations, CLI dispatch) stays on `anyhow`.

use thiserror::Error;

/// Everything that can go wrong while driving a document through the pipeline.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Reading a document or walking the uploads directory failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A backend could not be reached, or kept failing after every retry.
    #[error("{backend} request failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    /// A backend answered with a non-retryable (or finally failing) status.
    #[error("{backend} returned HTTP {status}: {body}")]
    Status {
        backend: &'static str,
        status: u16,
        body: String,
    },

    /// The embedding backend answered with a body we cannot classify.
    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    /// Reading or writing the processed-files table failed.
    #[error("bookkeeping error: {0}")]
    Bookkeeping(String),

    /// The cluster-wide lock could not be acquired or released.
    #[error("lock error: {0}")]
    Lock(String),

    /// Points reached the vector index but the bookkeeping row was never
    /// written. Needs a human to reconcile the index and the table.
    #[error("{points} points for {path} (fingerprint {fingerprint}) are indexed but unrecorded: {reason}")]
    Unrecorded {
        path: String,
        fingerprint: String,
        points: usize,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl IngestError {
    /// Errors that leave the index and the bookkeeping table disagreeing.
    ///
    /// These abort the whole batch instead of being collected per document.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, IngestError::Unrecorded { .. })
    }
}

impl From<sqlx::Error> for IngestError {
    fn from(err: sqlx::Error) -> Self {
        IngestError::Bookkeeping(err.to_string())
    }
}

impl From<walkdir::Error> for IngestError {
    fn from(err: walkdir::Error) -> Self {
        IngestError::Io(err.into())
    }
}

/// Convenience alias used across the library.
pub type IngestResult<T> = Result<T, IngestError>;
