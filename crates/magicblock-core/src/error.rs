//! Core error types for magicblock-core.
//!
//! This module defines the error hierarchy using thiserror. Every fallible
//! operation in the crate returns one of the domain enums below, and they all
//! convert into [`CoreError`] for callers that don't care about the detail.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for magicblock-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Persisted-store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Content fetch errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Question selection errors
    #[error("Quiz error: {0}")]
    Quiz(#[from] QuizError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Errors raised by a [`Store`](crate::storage::Store) implementation or by
/// record decoding on top of it.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Store is locked")]
    Locked,

    /// The persisted record has a schema version this build does not read
    #[error("Record '{key}' has schema version {found:?}, expected {expected}")]
    SchemaMismatch {
        key: String,
        found: Option<u32>,
        expected: u32,
    },

    /// The persisted record could not be decoded
    #[error("Record '{key}' is corrupt: {message}")]
    Corrupt { key: String, message: String },

    /// A record could not be serialized
    #[error("Failed to serialize record '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Data directory could not be prepared
    #[error("Data directory unavailable: {0}")]
    DataDir(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Errors from fetching remote question content.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport-level failure
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Response body did not have the expected shape
    #[error("Could not decode {url}: {message}")]
    Decode { url: String, message: String },

    /// Requested content does not exist in the source
    #[error("No content at {0}")]
    Missing(String),
}

/// Errors from selecting a question to serve.
#[derive(Error, Debug)]
pub enum QuizError {
    /// The registry holds no datasets
    #[error("No datasets registered")]
    NoDatasets,

    /// The chosen dataset has no items in any box
    #[error("Dataset '{0}' has no items")]
    NoItems(String),

    /// A dataset identity was not found in the registry
    #[error("Unknown dataset '{0}'")]
    UnknownDataset(String),

    /// Content for the selected item could not be fetched
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Dataset identity is not `<username>.<repository>.<branch>`
    #[error("Invalid dataset identity '{0}': expected <username>.<repository>.<branch>")]
    InvalidDatasetId(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
