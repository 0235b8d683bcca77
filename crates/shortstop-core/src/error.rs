use crate::shortcode::ShortCode;
use thiserror::Error;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors a storage backend can return.
///
/// `NotFound` and `Deleted` are distinguished so a caller can answer
/// "never existed" and "existed, now withdrawn" differently. `Conflict`
/// carries the short code that is already taken, so the caller can still
/// surface it to the client.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("short code not found: {0}")]
    NotFound(ShortCode),
    #[error("short code deleted: {0}")]
    Deleted(ShortCode),
    #[error("url already exists: {0}")]
    Conflict(ShortCode),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("log file i/o failed: {0}")]
    Io(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("schema migration failed: {0}")]
    Migration(String),
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}
