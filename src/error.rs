//! Error types surfaced by the search core.
//!
//! Store and provider plumbing uses `anyhow`; the engine converts those
//! failures into [`SearchError`] at its boundary so callers can match on
//! the failure class.

use thiserror::Error;

use crate::circuit_breaker::CircuitOpenError;
use crate::models::DocumentStatus;

/// Failure classes returned by [`SearchEngine`](crate::search::SearchEngine).
#[derive(Debug, Error)]
pub enum SearchError {
    /// Rejected input (empty embedding text, bad pagination). Not retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The index store or document registry failed. Aborts the request.
    #[error("{operation} failed: {cause:#}")]
    Dependency {
        operation: &'static str,
        #[source]
        cause: anyhow::Error,
    },

    /// A breaker-guarded dependency is failing fast.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    /// The local fallback embedding could not be produced either.
    #[error("embedding generation failed: {0}")]
    Embedding(String),

    #[error("document is not ready for indexing, status: {0}")]
    NotReady(DocumentStatus),

    #[error("{0} not found")]
    NotFound(String),
}

impl SearchError {
    pub(crate) fn dependency(operation: &'static str, cause: anyhow::Error) -> Self {
        SearchError::Dependency { operation, cause }
    }

    /// True for failures of an external collaborator, including an open breaker.
    pub fn is_dependency(&self) -> bool {
        matches!(
            self,
            SearchError::Dependency { .. } | SearchError::CircuitOpen(_)
        )
    }
}

/// Cache failures. Logged by the engine and never surfaced from a search.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache lock poisoned")]
    Poisoned,
}

pub type Result<T, E = SearchError> = std::result::Result<T, E>;
