use courier_util::validation::ValidationError;
use thiserror::Error;

/// Failure modes shared by every data-layer operation.
///
/// Errors are `Clone` because one deduplicated fetch may hand the same
/// result to several waiters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Transport or fetch failure; may be transient.
    #[error("network error: {0}")]
    Network(String),
    /// Non-success response or an explicit error from the server.
    #[error("server error: {0}")]
    Server(String),
    /// Response or frame that could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Operation not valid for the current local state.
    #[error("invalid state: {0}")]
    State(String),
    #[error("invalid input: {0}")]
    Invalid(#[from] ValidationError),
}

impl CoreError {
    /// Worth retrying later without user action.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Network(_))
    }
}
