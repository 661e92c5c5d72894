//! Error types shared across ReelVault crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, ReelError>;

/// Main error type for shared functionality
#[derive(Error, Debug)]
pub enum ReelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown entity kind: {0}")]
    UnknownKind(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
