//! Error types for postmetrics-core

use thiserror::Error;

/// Main error type for the postmetrics-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Chunker called with an unusable range
    #[error("invalid date range: {0}")]
    InvalidRange(String),

    /// Network or HTTP failure for a single chunk fetch
    #[error("transport error: {0}")]
    Transport(String),

    /// Primary store is not provisioned (its backing tables are missing)
    #[error("primary store unavailable: {0}")]
    StoreUnavailable(String),

    /// Transient primary store failure
    #[error("primary store query failed: {0}")]
    StoreQuery(String),

    /// Malformed remote response body
    #[error("parse error: {0}")]
    Parse(String),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Blocking storage task panicked or was cancelled
    #[error("storage task failed: {0}")]
    Task(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Resolution aborted by the caller
    #[error("resolution cancelled")]
    Cancelled,
}

/// Result type alias for postmetrics-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::Transport("API error (503): unavailable".to_string());
        assert_eq!(
            err.to_string(),
            "transport error: API error (503): unavailable"
        );
        assert_eq!(Error::Cancelled.to_string(), "resolution cancelled");
    }
}
