//! Custom error types for labpubs.
//!
//! This module defines all error types used throughout the pipeline.
//! All fallible functions return `Result<T, PubsError>` instead of using `unwrap()`.

use thiserror::Error;

/// Main error type for labpubs operations.
///
/// Uses `thiserror` for ergonomic error handling and automatic `Display` implementation.
#[derive(Debug, Error)]
pub enum PubsError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Registry returned a non-success status
    #[error("Registry error: {code} - {message}")]
    Registry {
        /// HTTP status code
        code: u16,
        /// Error message
        message: String,
    },

    /// Record-level lookup resolved to a missing work (terminal, not retried)
    #[error("Work not found: {0}")]
    NotFound(String),

    /// Response body could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV export error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using `PubsError`
pub type Result<T> = std::result::Result<T, PubsError>;
