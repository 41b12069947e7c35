//! Remote record store contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{RetryClass, SyncErrorKind};
use crate::entities::{RecordType, RemoteKey, RemoteRecord};

/// Why the remote store cannot be used right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// No signed-in account.
    NoAccount,
    /// Account exists but access is restricted (parental controls, MDM, revoked).
    Restricted,
    /// The probe itself failed; availability is indeterminate.
    CouldNotDetermine,
    /// Service-side outage.
    TemporarilyUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum Availability {
    Available,
    Unavailable(UnavailableReason),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

/// Classified remote failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("account unavailable: {0:?}")]
    AccountUnavailable(UnavailableReason),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("record not found: {0}")]
    RecordNotFound(RemoteKey),

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("unknown remote error: {0}")]
    Unknown(String),
}

impl RemoteError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkUnavailable(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown(message.into())
    }

    pub fn kind(&self) -> SyncErrorKind {
        match self {
            Self::NetworkUnavailable(_) => SyncErrorKind::NetworkUnavailable,
            Self::AccountUnavailable(_) => SyncErrorKind::AccountUnavailable,
            Self::QuotaExceeded(_) => SyncErrorKind::QuotaExceeded,
            Self::RecordNotFound(_) => SyncErrorKind::RecordNotFound,
            Self::Malformed(_) => SyncErrorKind::Malformed,
            Self::Unknown(_) => SyncErrorKind::Unknown,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> RetryClass {
        self.kind().retry_class()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound(_))
    }
}

/// Optional filter for `RemoteStore::fetch`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordQuery {
    pub client_id: Option<Uuid>,
}

impl RecordQuery {
    pub fn for_client(client_id: Uuid) -> Self {
        Self {
            client_id: Some(client_id),
        }
    }
}

/// Per-record outcome of `RemoteStore::batch_save`, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerRecordResult {
    pub remote_key: RemoteKey,
    pub result: Result<(), RemoteError>,
}

/// Thin async facade over the authoritative record store.
///
/// Implementations hold no cache state and never swallow errors.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn check_availability(&self) -> Availability;

    async fn fetch(
        &self,
        record_type: RecordType,
        query: Option<&RecordQuery>,
    ) -> Result<Vec<RemoteRecord>, RemoteError>;

    async fn save(&self, record: &RemoteRecord) -> Result<(), RemoteError>;

    async fn delete(&self, remote_key: &RemoteKey) -> Result<(), RemoteError>;

    async fn batch_save(&self, records: &[RemoteRecord]) -> Vec<PerRecordResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_follow_variants() {
        let key = RemoteKey::from_id(Uuid::new_v4());
        assert_eq!(
            RemoteError::network("offline").kind(),
            SyncErrorKind::NetworkUnavailable
        );
        assert_eq!(
            RemoteError::AccountUnavailable(UnavailableReason::NoAccount).retry_class(),
            RetryClass::ReauthRequired
        );
        assert!(RemoteError::RecordNotFound(key).is_not_found());
        assert_eq!(
            RemoteError::malformed("bad").retry_class(),
            RetryClass::Permanent
        );
    }

    #[test]
    fn availability_serializes_with_reason() {
        let json = serde_json::to_value(Availability::Unavailable(UnavailableReason::Restricted))
            .expect("serialize availability");
        assert_eq!(
            json,
            serde_json::json!({ "state": "unavailable", "reason": "restricted" })
        );
    }
}
