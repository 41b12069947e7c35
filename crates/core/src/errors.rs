//! Error types shared across the workspace.

use thiserror::Error;

use crate::sync::RemoteError;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The remote record store rejected or could not serve a request.
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// Durable local storage failed.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The caller supplied an entity that violates an invariant.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// The remote error carried by this error, if any.
    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(err) => Some(err),
            _ => None,
        }
    }
}
