//! Error types for the Turnstile service.

use thiserror::Error;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No client record exists for the key
    #[error("Client not found: {0}")]
    ClientNotFound(String),

    /// A client record already exists for the key
    #[error("Client already exists: {0}")]
    ClientExists(String),

    /// Client record failed validation
    #[error("Invalid client: {0}")]
    InvalidClient(String),

    /// Client directory backend failure
    #[error("Client directory error: {0}")]
    Directory(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for TurnstileError {
    fn from(e: config::ConfigError) -> Self {
        TurnstileError::Config(e.to_string())
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
