//! Error types for the remote record store crate.

use clientfolio_core::entities::RemoteKey;
use clientfolio_core::sync::{
    classify_http_status, RemoteError, RetryClass, SyncErrorKind, UnavailableReason,
};
use thiserror::Error;

/// Result type alias for record store operations.
pub type Result<T> = std::result::Result<T, RecordStoreError>;

/// Error code the service uses for exhausted storage or request quota.
pub const QUOTA_EXCEEDED_CODE: &str = "QUOTA_EXCEEDED";

/// Errors that can occur while talking to the hosted record store.
#[derive(Debug, Error)]
pub enum RecordStoreError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response from the record store
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Authentication error (missing or invalid token)
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl RecordStoreError {
    pub fn api(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error into the sync error taxonomy.
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            Self::Api { status, code, .. } => {
                if code.as_deref() == Some(QUOTA_EXCEEDED_CODE) {
                    SyncErrorKind::QuotaExceeded
                } else {
                    classify_http_status(*status)
                }
            }
            Self::Http(err) if err.is_timeout() || err.is_connect() || err.is_request() => {
                SyncErrorKind::NetworkUnavailable
            }
            Self::Http(err) if err.is_decode() => SyncErrorKind::Malformed,
            Self::Http(_) => SyncErrorKind::Unknown,
            Self::Json(_) => SyncErrorKind::Malformed,
            Self::Auth(_) => SyncErrorKind::AccountUnavailable,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> RetryClass {
        self.kind().retry_class()
    }

    /// Converts into the store-agnostic error; `remote_key` names the record
    /// a not-found response refers to.
    pub fn into_remote(self, remote_key: Option<&RemoteKey>) -> RemoteError {
        let kind = self.kind();
        let message = self.to_string();
        match kind {
            SyncErrorKind::NetworkUnavailable => RemoteError::NetworkUnavailable(message),
            SyncErrorKind::AccountUnavailable => {
                let reason = match self.status_code() {
                    Some(403) => UnavailableReason::Restricted,
                    _ => UnavailableReason::NoAccount,
                };
                RemoteError::AccountUnavailable(reason)
            }
            SyncErrorKind::QuotaExceeded => RemoteError::QuotaExceeded(message),
            SyncErrorKind::RecordNotFound => match remote_key {
                Some(key) => RemoteError::RecordNotFound(key.clone()),
                None => RemoteError::Unknown(message),
            },
            SyncErrorKind::Malformed => RemoteError::Malformed(message),
            SyncErrorKind::Unknown => RemoteError::Unknown(message),
        }
    }
}
