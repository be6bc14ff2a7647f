//! Error types for the NoAPI service.

use thiserror::Error;

/// Main error type for NoAPI operations.
#[derive(Error, Debug)]
pub enum NoapiError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reason list could not be loaded
    #[error("Reasons error: {0}")]
    Reasons(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for NoAPI operations.
pub type Result<T> = std::result::Result<T, NoapiError>;
