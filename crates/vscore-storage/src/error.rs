//! Storage error types.

use std::fmt;

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Object-store operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOp {
    Put,
    Get,
    Delete,
}

impl fmt::Display for TransferOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransferOp::Put => "put",
            TransferOp::Get => "get",
            TransferOp::Delete => "delete",
        })
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage not configured: {0}")]
    ConfigError(String),

    #[error("No object at {0}")]
    NotFound(String),

    #[error("Object {op} failed for {key}: {reason}")]
    Transfer { op: TransferOp, key: String, reason: String },

    /// Locator that is malformed or belongs to another store.
    #[error("Locator {0} cannot be resolved by this store")]
    InvalidLocator(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn transfer(op: TransferOp, key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transfer {
            op,
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_locator(locator: impl Into<String>) -> Self {
        Self::InvalidLocator(locator.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_message_names_key() {
        let err = StorageError::transfer(TransferOp::Put, "final/v1/a.mp4", "timed out");
        assert_eq!(err.to_string(), "Object put failed for final/v1/a.mp4: timed out");
    }
}
