//! Error types for the trellis-nodestore crate

use thiserror::Error;

/// Result type alias using `StoreError`
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during node storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Key not found in the backend
    #[error("key not found: {0}")]
    NotFound(String),

    /// Backend-specific failure
    #[error("backend error: {0}")]
    Backend(String),

    /// Codec error
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced while encoding or decoding stored values
#[derive(Error, Debug)]
pub enum CodecError {
    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),
}
