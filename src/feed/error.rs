use serde::Serialize;
use thiserror::Error;

/// Errors returned by a [`FeedSource`](super::FeedSource).
///
/// Surfaced to the caller as-is; the client never retries.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Transport failure (DNS, connection, TLS, broken body stream)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// The request did not complete within the configured timeout
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    /// The request URL could not be built from the inputs
    #[error("Bad request: {0}")]
    BadRequest(String),
    /// Base URL is plain HTTP on a non-local host
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    /// Response body did not match the expected schema
    #[error("Unexpected response: {0}")]
    Decode(String),
    /// Response body exceeded the size cap
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    /// Non-2xx status or a `status: "error"` envelope
    #[error("Request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Coarse error classification exposed in sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Network,
    Decode,
    BadRequest,
    Rejected,
}

impl FeedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FeedError::Network(_) | FeedError::Timeout(_) => ErrorKind::Network,
            FeedError::BadRequest(_) | FeedError::InsecureBaseUrl => ErrorKind::BadRequest,
            FeedError::Decode(_) | FeedError::ResponseTooLarge(_) => ErrorKind::Decode,
            FeedError::Rejected { .. } => ErrorKind::Rejected,
        }
    }
}
