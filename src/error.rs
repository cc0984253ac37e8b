//! Error types for mdevstore
//!
//! Provides a unified error type for all operations.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for mdevstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    /// Unsupported coordinate size, event kind, open mode or block shape
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// Requested record layout disagrees with what the container holds
    #[error("Layout mismatch: {0}")]
    Layout(String),

    /// Deliberately unsupported path (e.g. mixed-precision writes)
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    // -------------------------------------------------------------------------
    // File Errors
    // -------------------------------------------------------------------------
    #[error("{message}: {}", path.display())]
    File { message: String, path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Build a file error naming the offending path
    pub fn file(message: impl Into<String>, path: impl AsRef<Path>) -> Self {
        StoreError::File {
            message: message.into(),
            path: path.as_ref().to_path_buf(),
        }
    }

    /// True for the file-error family (missing file, bad version, read past end)
    pub fn is_file_error(&self) -> bool {
        matches!(self, StoreError::File { .. })
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
