//! Error types for the mailhog-storage crate.

use std::sync::PoisonError;

use mailhog_common::MessageId;
use thiserror::Error;

/// Errors returned by [`crate::Storage`] implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No message with this ID is stored.
    #[error("Message not found: {0}")]
    NotFound(MessageId),

    /// The backend refuses to hold any more messages.
    #[error("Storage capacity exceeded: {stored}/{capacity} messages")]
    CapacityExceeded { stored: usize, capacity: usize },

    /// Search kind other than `to`, `from` or `containing`.
    #[error("Invalid search kind: {0}")]
    InvalidSearchKind(String),

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl<T> From<PoisonError<T>> for StorageError {
    fn from(err: PoisonError<T>) -> Self {
        Self::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
