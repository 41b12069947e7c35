//! Failure classification shared by the remote client and the sync manager.

use serde::{Deserialize, Serialize};

/// Retry policy classification for remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

impl RetryClass {
    /// Connectivity and account failures are parked in the offline queue;
    /// permanent ones are surfaced to the caller.
    pub fn is_queueable(&self) -> bool {
        matches!(self, RetryClass::Retryable | RetryClass::ReauthRequired)
    }
}

/// Coarse error kind exposed through the sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    NetworkUnavailable,
    AccountUnavailable,
    QuotaExceeded,
    RecordNotFound,
    Malformed,
    Unknown,
}

impl SyncErrorKind {
    pub fn retry_class(&self) -> RetryClass {
        match self {
            SyncErrorKind::NetworkUnavailable => RetryClass::Retryable,
            SyncErrorKind::AccountUnavailable => RetryClass::ReauthRequired,
            SyncErrorKind::QuotaExceeded
            | SyncErrorKind::RecordNotFound
            | SyncErrorKind::Malformed
            | SyncErrorKind::Unknown => RetryClass::Permanent,
        }
    }
}

/// Classify an HTTP status from the record store into an error kind.
///
/// Success statuses are not errors; callers only pass failures.
pub fn classify_http_status(status: u16) -> SyncErrorKind {
    match status {
        401 | 403 => SyncErrorKind::AccountUnavailable,
        404 | 410 => SyncErrorKind::RecordNotFound,
        402 | 429 | 507 => SyncErrorKind::QuotaExceeded,
        400 | 409 | 413 | 422 => SyncErrorKind::Malformed,
        408 | 502 | 503 | 504 => SyncErrorKind::NetworkUnavailable,
        _ => SyncErrorKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_http_status_for_retry_policy() {
        assert_eq!(classify_http_status(503), SyncErrorKind::NetworkUnavailable);
        assert_eq!(classify_http_status(429), SyncErrorKind::QuotaExceeded);
        assert_eq!(classify_http_status(401), SyncErrorKind::AccountUnavailable);
        assert_eq!(classify_http_status(404), SyncErrorKind::RecordNotFound);
        assert_eq!(classify_http_status(422), SyncErrorKind::Malformed);
        assert_eq!(classify_http_status(500), SyncErrorKind::Unknown);
    }

    #[test]
    fn only_connectivity_and_account_failures_are_queueable() {
        assert!(SyncErrorKind::NetworkUnavailable
            .retry_class()
            .is_queueable());
        assert!(SyncErrorKind::AccountUnavailable
            .retry_class()
            .is_queueable());
        assert!(!SyncErrorKind::QuotaExceeded.retry_class().is_queueable());
        assert!(!SyncErrorKind::Malformed.retry_class().is_queueable());
        assert!(!SyncErrorKind::Unknown.retry_class().is_queueable());
    }
}
