//! Error taxonomy for the retrieval core.
//!
//! Only backend-facing operations fail: parsing persisted data, embedding,
//! and vector index mutation/search/persistence. Unknown chunk or document
//! ids are never errors; absence shows up as empty results or zero counts.

use thiserror::Error;

/// Boxed cause carried by [`Error::Embedding`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the graph index, embedding providers and vector index.
#[derive(Debug, Error)]
pub enum Error {
    /// Persisted index or vector metadata could not be parsed.
    #[error("malformed index data: {0}")]
    Format(String),

    /// The embedding backend or its transport failed. Batches are
    /// all-or-nothing, so no partial result accompanies this error.
    #[error("embedding failed: {0}")]
    Embedding(#[source] BoxError),

    /// A lazily initialised backend (embedding model, similarity structure)
    /// is not installed, configured or reachable.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A vector did not match the index dimension.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap any displayable cause as an [`Error::Embedding`].
    pub fn embedding(cause: impl Into<BoxError>) -> Self {
        Error::Embedding(cause.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Format(err.to_string())
    }
}

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, Error>;
