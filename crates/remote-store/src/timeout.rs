//! Per-call timeout decorator for remote stores.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;

use clientfolio_core::entities::{RecordType, RemoteKey, RemoteRecord};
use clientfolio_core::sync::{
    Availability, PerRecordResult, RecordQuery, RemoteError, RemoteStore, UnavailableReason,
};

/// Wraps a [`RemoteStore`] so that every call gives up after `timeout`.
///
/// An elapsed call is reported as `NetworkUnavailable`, which routes writes
/// to the offline queue like any other connectivity failure.
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: RemoteStore> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "[RecordStore] {} timed out after {:?}",
                    operation, self.timeout
                );
                Err(RemoteError::network(format!(
                    "{} timed out after {:?}",
                    operation, self.timeout
                )))
            }
        }
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for TimeoutStore<S> {
    async fn check_availability(&self) -> Availability {
        match tokio::time::timeout(self.timeout, self.inner.check_availability()).await {
            Ok(availability) => availability,
            Err(_) => {
                warn!(
                    "[RecordStore] Availability probe timed out after {:?}",
                    self.timeout
                );
                Availability::Unavailable(UnavailableReason::CouldNotDetermine)
            }
        }
    }

    async fn fetch(
        &self,
        record_type: RecordType,
        query: Option<&RecordQuery>,
    ) -> Result<Vec<RemoteRecord>, RemoteError> {
        self.bounded("fetch", self.inner.fetch(record_type, query))
            .await
    }

    async fn save(&self, record: &RemoteRecord) -> Result<(), RemoteError> {
        self.bounded("save", self.inner.save(record)).await
    }

    async fn delete(&self, remote_key: &RemoteKey) -> Result<(), RemoteError> {
        self.bounded("delete", self.inner.delete(remote_key)).await
    }

    async fn batch_save(&self, records: &[RemoteRecord]) -> Vec<PerRecordResult> {
        match tokio::time::timeout(self.timeout, self.inner.batch_save(records)).await {
            Ok(results) => results,
            Err(_) => {
                warn!(
                    "[RecordStore] batch_save of {} records timed out after {:?}",
                    records.len(),
                    self.timeout
                );
                records
                    .iter()
                    .map(|record| PerRecordResult {
                        remote_key: record.remote_key.clone(),
                        result: Err(RemoteError::network("batch_save timed out")),
                    })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryRecordStore;
    use clientfolio_core::entities::{ClientProfile, SyncableEntity};
    use clientfolio_core::sync::SyncErrorKind;

    #[tokio::test]
    async fn slow_calls_become_network_unavailable() {
        let inner = MemoryRecordStore::new();
        inner.set_latency(Duration::from_millis(200));
        let store = TimeoutStore::new(inner, Duration::from_millis(20));
        let record = ClientProfile::new("Alice", "alice@example.com").to_record();

        let err = store.save(&record).await.expect_err("timed out");
        assert_eq!(err.kind(), SyncErrorKind::NetworkUnavailable);

        let results = store.batch_save(&[record.clone()]).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].result.is_err());

        assert_eq!(
            store.check_availability().await,
            Availability::Unavailable(UnavailableReason::CouldNotDetermine)
        );
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let store = TimeoutStore::new(MemoryRecordStore::new(), Duration::from_secs(1));
        let record = ClientProfile::new("Bob", "bob@example.com").to_record();

        store.save(&record).await.expect("save");
        let fetched = store
            .fetch(RecordType::ClientProfile, None)
            .await
            .expect("fetch");

        assert_eq!(fetched, vec![record]);
        assert_eq!(store.inner.save_calls(), 1);
    }
}
