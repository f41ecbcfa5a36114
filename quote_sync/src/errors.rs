//! Error types for the cache and sync layers.
//!
//! Every type here is `Clone`: a coalesced in-flight request hands the same
//! result, error included, to every waiter. Diesel and task errors are
//! therefore captured as strings.

use market_data_ingestor::errors::{AuthError, FetchError};
use market_data_ingestor::models::RangeError;
use thiserror::Error;

/// Cached bytes no longer match the checksum recorded at write time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataIntegrityError {
    #[error("checksum mismatch for cached entry {key}")]
    ChecksumMismatch { key: String },
}

/// Errors raised by the persistent quote store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A write was refused; the surrounding transaction rolled back.
    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Integrity(#[from] DataIntegrityError),

    #[error("database error: {0}")]
    Database(String),

    #[error("migration error: {0}")]
    Migration(String),

    /// The blocking worker panicked or the connection lock was poisoned.
    #[error("store task failed: {0}")]
    Task(String),
}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<diesel::ConnectionError> for StoreError {
    fn from(err: diesel::ConnectionError) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Errors raised by the in-memory entry cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error(transparent)]
    Integrity(#[from] DataIntegrityError),

    #[error("could not encode or decode cache entry: {0}")]
    Encode(String),

    #[error("entry {key} is {size} bytes, larger than the {budget} byte budget")]
    EntryTooLarge { key: String, size: u64, budget: u64 },
}

/// Errors surfaced by [`SyncEngine`](crate::engine::SyncEngine).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    InvalidRange(#[from] RangeError),
}
