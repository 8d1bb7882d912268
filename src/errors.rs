//! Centralized error handling for timelapse-tools
//!
//! Every fallible operation in the crate returns [`TimelapseError`]. Validation
//! errors (`InvalidArgument`, `ConflictingArguments`, `InvalidDimension`) are
//! raised before any read is scheduled; read failures surface unmodified.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for timelapse-tools operations
#[derive(Debug, Error)]
pub enum TimelapseError {
    /// Path does not exist
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Path denotes a directory where a single file was expected
    #[error("Please provide a single file. Received directory: {}", path.display())]
    IsADirectory { path: PathBuf },

    /// Wrong kind of argument, unrecognized source or malformed selector
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A fixed selector targets the active operating dimension
    #[error("Conflicting arguments: {message}")]
    ConflictingArguments { message: String },

    /// Requested dimension absent from the file, or a non-positive declared length
    #[error("Invalid dimension '{dim}': {message}")]
    InvalidDimension { dim: String, message: String },

    /// The file reports no usable dimensions, or a read failed unexpectedly
    #[error("Corrupt source: {message}")]
    CorruptSource { message: String },

    /// I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl TimelapseError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn conflicting(message: impl Into<String>) -> Self {
        Self::ConflictingArguments {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_dimension(dim: impl ToString, message: impl Into<String>) -> Self {
        Self::InvalidDimension {
            dim: dim.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptSource {
            message: message.into(),
        }
    }
}

/// Result type alias for timelapse-tools operations
pub type Result<T> = std::result::Result<T, TimelapseError>;
