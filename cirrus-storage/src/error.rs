//! Storage error types.

use std::io;
use thiserror::Error;

/// Storage operation errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error during storage operation
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Table, container, queue or blob not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity with the same key already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Entity is missing its key properties or is otherwise malformed
    #[error("Invalid entity: {0}")]
    InvalidEntity(String),

    /// Resource or blob name that cannot be stored safely
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Corrupt account file
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Storage backend error
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Check if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
            || matches!(self, StorageError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }

    /// Check if this is a duplicate key error.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StorageError::AlreadyExists(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        let err = StorageError::NotFound("users".to_string());
        assert!(err.is_not_found());

        let io_err = StorageError::Io(io::Error::new(io::ErrorKind::NotFound, "not found"));
        assert!(io_err.is_not_found());

        assert!(!StorageError::Backend("boom".to_string()).is_not_found());
    }

    #[test]
    fn test_is_already_exists() {
        let err = StorageError::AlreadyExists("users/p1/r1".to_string());
        assert!(err.is_already_exists());
        assert!(!StorageError::NotFound("x".to_string()).is_already_exists());
    }

    #[test]
    fn test_error_display() {
        let err = StorageError::AlreadyExists("users/p1/r2".to_string());
        assert_eq!(err.to_string(), "Already exists: users/p1/r2");
    }
}
