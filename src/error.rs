//! Error types for the listing store.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt state in {path}: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    #[error("Failed to write {path}: {source}")]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid model name: {0:?}")]
    InvalidModelName(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<csv::Error> for StoreError {
    fn from(e: csv::Error) -> Self {
        StoreError::Csv(e.to_string())
    }
}

/// Why a single raw record was rejected by the normalizer.
///
/// These never abort a batch; they are collected into the batch report.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` has invalid value {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("price must be non-negative, got {0}")]
    NegativePrice(i64),

    #[error("mileage must be non-negative, got {0}")]
    NegativeMileage(i64),

    #[error("record belongs to model `{got}`, batch is for `{expected}`")]
    ModelMismatch { expected: String, got: String },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
