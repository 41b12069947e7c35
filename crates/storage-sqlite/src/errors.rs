//! Storage error type and its conversion into the core error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Database connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The write actor thread has stopped or dropped the reply.
    #[error("Database writer is not running")]
    WriterClosed,
}

impl From<StorageError> for clientfolio_core::Error {
    fn from(err: StorageError) -> Self {
        clientfolio_core::Error::Storage(err.to_string())
    }
}
