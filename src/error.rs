//! Crate-wide error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MemoryError>;

#[derive(Debug, Error)]
pub enum MemoryError {
    /// Id does not exist in the store.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller-supplied input violates an invariant.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Underlying SQLite failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Filesystem failure around the database or a snapshot file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The configured embedding provider failed to produce a vector.
    #[error("embedding provider error: {0}")]
    EmbeddingProvider(String),

    /// A write lost the lock too many times in a row.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl MemoryError {
    /// True for transient lock contention that a caller may retry.
    pub fn is_contention(&self) -> bool {
        match self {
            MemoryError::Storage(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
