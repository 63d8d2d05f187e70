//! Error types for lshdb-core.

use thiserror::Error;

/// Result type alias for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors returned by the vector index.
///
/// Every mutating operation that returns an error leaves the index unchanged.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Vector length does not match the index dimension.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    /// An insert reused an id that is already stored.
    #[error("Duplicate id: {0}")]
    DuplicateId(u64),

    /// Lookup of an id that is not stored.
    #[error("Id not found: {0}")]
    NotFound(u64),

    /// Corrupt, truncated, or incompatible index file.
    #[error("Index file format error: {0}")]
    FormatError(String),

    /// Bad query or construction parameter.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error wrapper.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub(crate) fn check_dimension(expected: usize, actual: usize) -> IndexResult<()> {
        if expected != actual {
            return Err(IndexError::InvalidDimension { expected, actual });
        }
        Ok(())
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        IndexError::FormatError(msg.into())
    }
}
