//! Error taxonomy for fetching and persistence
//!
//! Config, connect and schema errors are fatal for a run and surface through
//! [`IngestError`]. Fetch and save errors are per-kind / per-record and end
//! up as data in the run and save summaries.

use reelvault_common::{EntityKind, ReelError};
use thiserror::Error;

/// Storage configuration is missing or invalid
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{kind} storage is missing required fields: {}", fields.join(", "))]
    MissingFields { kind: String, fields: Vec<String> },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to load configuration: {0}")]
    Load(String),
}

/// Failure to fetch one entity from the remote source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("Source unreachable after {attempts} attempt(s): {reason}")]
    Unreachable { attempts: u32, reason: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// The backend could not acquire its handle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to connect {backend} backend: {reason}")]
pub struct ConnectError {
    pub backend: &'static str,
    pub reason: String,
}

/// The backend could not create or validate its structure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Backend is not connected")]
    NotConnected,

    #[error("Failed to prepare {backend} schema: {reason}")]
    Failed { backend: &'static str, reason: String },
}

/// Failure to persist one record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaveError {
    #[error("Backend is not connected")]
    NotConnected,

    #[error("Duplicate key: {kind}/{key}")]
    DuplicateKey { kind: EntityKind, key: String },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),
}

/// Failure to read records back
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("Backend is not connected")]
    NotConnected,

    #[error("Query failed: {0}")]
    Backend(String),
}

/// Fatal errors that abort a run before or instead of producing a summary
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl From<std::io::Error> for SaveError {
    fn from(err: std::io::Error) -> Self {
        SaveError::IoFailure(err.to_string())
    }
}

impl From<ReelError> for SaveError {
    fn from(err: ReelError) -> Self {
        SaveError::IoFailure(err.to_string())
    }
}

impl From<std::io::Error> for QueryError {
    fn from(err: std::io::Error) -> Self {
        QueryError::Backend(err.to_string())
    }
}

impl From<ReelError> for QueryError {
    fn from(err: ReelError) -> Self {
        QueryError::Backend(err.to_string())
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(err: sqlx::Error) -> Self {
        QueryError::Backend(err.to_string())
    }
}
