//! Blob storage error types

use thiserror::Error;

/// Errors from document blob storage backends
#[derive(Error, Debug)]
pub enum BlobError {
    /// No object at the given location
    #[error("Blob not found: {location}")]
    NotFound { location: String },

    /// The location string is not one this backend understands
    #[error("Invalid blob location: {0}")]
    InvalidLocation(String),

    /// Backend-specific failure
    #[error("Blob backend error: {0}")]
    Backend(String),

    /// IO error (filesystem backend)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
