use std::time::Duration;
use thiserror::Error;

/// Failure reported by a search backend. Carried unchanged inside
/// [`SearchError::Execution`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("malformed query: {0}")]
    MalformedQuery(String),
    #[error("index missing: {0}")]
    IndexMissing(String),
    #[error("backend error: {0}")]
    Internal(String),
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("search execution failed: {0}")]
    Execution(#[from] BackendError),
    #[error("object not found")]
    NotFound,
    #[error("document decode failed: {0}")]
    Decode(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SearchError>;
