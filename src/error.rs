//! Error types for cube construction, reduction and I/O.

use std::convert::Infallible;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building, transforming or persisting data containers.
#[derive(Error, Debug)]
pub enum CubeError {
    /// Malformed or inconsistent container (shape mismatch, bad axis, bad index)
    #[error("Data error: {message}")]
    Data {
        /// Description of the inconsistency
        message: String,
    },

    /// No registered reader recognised the source
    #[error("No cube data found in {source_label}: {message}")]
    Io {
        /// Label of the source (file name or "<bytes>")
        source_label: String,
        /// Why the readers rejected it
        message: String,
    },

    /// Reduction method that is unknown or not implemented
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Operation needs a field that is absent on the container
    #[error("Missing {field}: required by {operation}")]
    MissingDependency {
        /// The absent field (uncertainty, mask, coordinates, ...)
        field: String,
        /// The operation that needed it
        operation: String,
    },

    /// Units with different physical dimensions
    #[error("Cannot convert unit '{from}' to '{to}'")]
    UnitConversion {
        /// Source unit symbol
        from: String,
        /// Target unit symbol
        to: String,
    },

    /// Malformed or unsupported FITS content
    #[error("Invalid FITS: {message}")]
    Fits {
        /// Description of the format error
        message: String,
    },

    /// Export target already exists
    #[error("Refusing to overwrite existing file: {path:?}")]
    FileExists {
        /// The path that was already present
        path: PathBuf,
    },

    /// Error reported by the FITS library
    #[error("FITS I/O error: {0}")]
    FitsIo(#[from] fitsio::errors::Error),

    /// I/O error during file operations
    #[error("IO error: {0}")]
    Fs(#[from] std::io::Error),

    /// JSON error while handling metadata
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Array reshaping error
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Configuration file could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// NumPy decoding error
    #[error("NumPy error: {0}")]
    Npy(#[from] ndarray_npy::ReadNpyError),
}

impl CubeError {
    /// Create a data (shape/consistency) error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Create a "no reader matched" error.
    pub fn io(source_label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            source_label: source_label.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation(message.into())
    }

    /// Create a missing-field error.
    pub fn missing(field: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::MissingDependency {
            field: field.into(),
            operation: operation.into(),
        }
    }

    /// Create a FITS format error.
    pub fn fits(message: impl Into<String>) -> Self {
        Self::Fits {
            message: message.into(),
        }
    }

    /// Check that two shapes agree, naming the offending array on failure.
    pub(crate) fn check_shape(what: &str, expected: &[usize], found: &[usize]) -> Result<()> {
        if expected == found {
            Ok(())
        } else {
            Err(Self::data(format!(
                "{what} shape {found:?} does not match data shape {expected:?}"
            )))
        }
    }
}

impl From<Infallible> for CubeError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, CubeError>;
