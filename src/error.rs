//! Custom error types for get-papers-list.
//!
//! All library functions return `Result<T, PapersError>` instead of using `unwrap()`.

use thiserror::Error;

/// Main error type for get-papers-list operations.
#[derive(Debug, Error)]
pub enum PapersError {
    /// Transport failure talking to E-utilities
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTTP 429 from the upstream API
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// Search returned zero ids
    #[error("No results found for query '{0}'")]
    NotFound(String),

    /// Payload could not be decoded as the expected schema
    #[error("Malformed response for {id}: {message}")]
    MalformedResponse {
        /// Ids of the payload that failed to decode
        id: String,
        /// Decoder message
        message: String,
    },

    /// Every detail fetch failed, so there is nothing to filter
    #[error("All {count} paper(s) failed to fetch; first error: {reason}")]
    FetchFailed {
        /// Number of ids that were skipped
        count: usize,
        /// Reason recorded for the first skipped id
        reason: String,
    },

    /// External API returned a non-success status
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl PapersError {
    /// Whether a retry with backoff may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            PapersError::Network(_) | PapersError::RateLimited(_) => true,
            PapersError::Api { code, .. } => (500..600).contains(code),
            _ => false,
        }
    }
}

impl From<csv::Error> for PapersError {
    fn from(err: csv::Error) -> Self {
        let message = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(io) => PapersError::Io(io),
            _ => PapersError::Validation(format!("CSV error: {}", message)),
        }
    }
}

/// Result type alias using `PapersError`
pub type Result<T> = std::result::Result<T, PapersError>;
