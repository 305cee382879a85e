//! Store errors

use thiserror::Error;

/// Errors that can occur when reading or writing the IPAM store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A unique constraint rejected the write
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The transaction was already committed or rolled back
    #[error("Transaction already closed")]
    TransactionClosed,

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend-specific failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this error came from a unique constraint
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation(_))
    }
}
