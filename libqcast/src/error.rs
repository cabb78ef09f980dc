//! Error types for qcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QcastError>;

#[derive(Error, Debug)]
pub enum QcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue store error: {0}")]
    Store(#[from] StoreError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl QcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            QcastError::InvalidInput(_) => 3,
            QcastError::Platform(PlatformError::Authentication(_)) => 2,
            QcastError::Platform(_) => 1,
            QcastError::Config(_) => 1,
            QcastError::Store(_) => 1,
        }
    }

    /// Whether this error is transient and worth retrying.
    ///
    /// Transient errors are network failures and rate limiting. Everything
    /// else (authentication, validation, API rejections, remote processing
    /// failures) is permanent for the current attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            QcastError::Platform(platform_error) => matches!(
                platform_error,
                PlatformError::Network(_) | PlatformError::RateLimit(_)
            ),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read queue file: {0}")]
    ReadError(std::io::Error),

    #[error("Failed to write queue file: {0}")]
    WriteError(std::io::Error),

    #[error("Failed to parse queue file: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Could not acquire queue file lock: {0}")]
    Locked(String),

    #[error("Media staging failed: {0}")]
    Staging(std::io::Error),

    #[error("Post not found: {0}")]
    NotFound(String),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Publishing failed: {0}")]
    Publish(String),

    #[error("Remote processing failed: {0}")]
    Processing(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}
