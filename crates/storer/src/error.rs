//! Storer error types.

use tether_primitives::{ChunkIndex, CodecError, FeedKey};

/// Errors from storer operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorerError {
    /// Database error.
    #[error("database error: {0}")]
    Database(String),

    /// No bundle stored at the index.
    #[error("chunk {index} not found in feed {feed}")]
    NotFound { feed: FeedKey, index: ChunkIndex },

    /// Feed is not hosted locally.
    #[error("unknown feed: {0}")]
    UnknownFeed(FeedKey),

    /// Feed store was closed.
    #[error("feed store closed: {0}")]
    Closed(FeedKey),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] CodecError),
}

/// Result type for storer operations.
pub type StorerResult<T> = Result<T, StorerError>;

impl From<redb::DatabaseError> for StorerError {
    fn from(err: redb::DatabaseError) -> Self {
        StorerError::Database(err.to_string())
    }
}

impl From<redb::TransactionError> for StorerError {
    fn from(err: redb::TransactionError) -> Self {
        StorerError::Database(err.to_string())
    }
}

impl From<redb::TableError> for StorerError {
    fn from(err: redb::TableError) -> Self {
        StorerError::Database(err.to_string())
    }
}

impl From<redb::StorageError> for StorerError {
    fn from(err: redb::StorageError) -> Self {
        StorerError::Database(err.to_string())
    }
}

impl From<redb::CommitError> for StorerError {
    fn from(err: redb::CommitError) -> Self {
        StorerError::Database(err.to_string())
    }
}
