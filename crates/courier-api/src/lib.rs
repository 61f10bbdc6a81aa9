pub mod client;
pub mod photo;

use courier_core::CoreError;

pub use client::{ApiClient, ApiClientConfig, DEFAULT_BASE_URL, MAX_RETRY_LIMIT};
pub use photo::{Photo, PhotoCache};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid base url: {0}")]
    InvalidUrl(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("request to {url} returned {status}")]
    Status { status: u16, url: String },
    #[error("invalid response: {0}")]
    Decode(String),
    /// The backend answered but refused the operation.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<ApiError> for CoreError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Http(msg) => CoreError::Network(msg),
            ApiError::Status { .. } | ApiError::Rejected(_) => CoreError::Server(err.to_string()),
            ApiError::Decode(msg) => CoreError::Protocol(msg),
            ApiError::InvalidUrl(msg) => CoreError::State(msg),
        }
    }
}
