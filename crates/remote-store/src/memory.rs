//! In-process record store with fault injection.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use clientfolio_core::entities::{RecordType, RemoteKey, RemoteRecord};
use clientfolio_core::sync::{
    Availability, PerRecordResult, RecordQuery, RemoteError, RemoteStore, UnavailableReason,
};

#[derive(Debug)]
struct MemoryState {
    records: BTreeMap<RemoteKey, RemoteRecord>,
    reachable: bool,
    availability: Availability,
    latency: Option<Duration>,
    fetch_failures: HashMap<RecordType, RemoteError>,
    key_failures: HashMap<RemoteKey, RemoteError>,
    scripted_saves: VecDeque<RemoteError>,
    scripted_deletes: VecDeque<RemoteError>,
    fetch_calls: HashMap<RecordType, usize>,
    save_calls: usize,
    delete_calls: usize,
    batch_calls: usize,
    availability_calls: usize,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            reachable: true,
            availability: Availability::Available,
            latency: None,
            fetch_failures: HashMap::new(),
            key_failures: HashMap::new(),
            scripted_saves: VecDeque::new(),
            scripted_deletes: VecDeque::new(),
            fetch_calls: HashMap::new(),
            save_calls: 0,
            delete_calls: 0,
            batch_calls: 0,
            availability_calls: 0,
        }
    }
}

impl MemoryState {
    fn offline_error(&self) -> Option<RemoteError> {
        (!self.reachable).then(|| RemoteError::network("remote store unreachable"))
    }

    fn apply_save(
        &mut self,
        record: &RemoteRecord,
        scripted: Option<RemoteError>,
    ) -> Result<(), RemoteError> {
        if let Some(err) = self.offline_error() {
            return Err(err);
        }
        if let Some(err) = scripted {
            return Err(err);
        }
        if let Some(err) = self.key_failures.get(&record.remote_key) {
            return Err(err.clone());
        }
        self.records.insert(record.remote_key.clone(), record.clone());
        Ok(())
    }
}

fn matches_query(record: &RemoteRecord, query: Option<&RecordQuery>) -> bool {
    let Some(client_id) = query.and_then(|q| q.client_id) else {
        return true;
    };
    let client_id = client_id.to_string();
    match record.record_type {
        RecordType::ClientProfile => record.remote_key.as_str() == client_id,
        _ => record.fields.text("clientId") == Some(client_id.as_str()),
    }
}

/// Authoritative record store living in process memory.
///
/// Faults are injected through setters: whole-store reachability, account
/// availability, per-type fetch failures, per-key write failures and one-shot
/// scripted save/delete failures. Every call is counted, including failed ones.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    state: Mutex<MemoryState>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn simulate_latency(&self) {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        debug!("[RecordStore] Memory store reachable={}", reachable);
        self.state().reachable = reachable;
    }

    pub fn is_reachable(&self) -> bool {
        self.state().reachable
    }

    pub fn set_availability(&self, availability: Availability) {
        self.state().availability = availability;
    }

    /// Delay applied before every call is served.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = Some(latency);
    }

    pub fn clear_latency(&self) {
        self.state().latency = None;
    }

    /// Every fetch of `record_type` fails with `error` until cleared.
    pub fn fail_fetch(&self, record_type: RecordType, error: RemoteError) {
        self.state().fetch_failures.insert(record_type, error);
    }

    pub fn clear_fetch_failure(&self, record_type: RecordType) {
        self.state().fetch_failures.remove(&record_type);
    }

    /// Every save or delete of `remote_key` fails with `error` until cleared.
    pub fn fail_key(&self, remote_key: &RemoteKey, error: RemoteError) {
        self.state().key_failures.insert(remote_key.clone(), error);
    }

    pub fn clear_key_failure(&self, remote_key: &RemoteKey) {
        self.state().key_failures.remove(remote_key);
    }

    /// The next single-record save fails with `error`.
    pub fn fail_next_save(&self, error: RemoteError) {
        self.state().scripted_saves.push_back(error);
    }

    /// The next delete fails with `error`.
    pub fn fail_next_delete(&self, error: RemoteError) {
        self.state().scripted_deletes.push_back(error);
    }

    /// Seeds a record without counting a save.
    pub fn insert(&self, record: RemoteRecord) {
        self.state()
            .records
            .insert(record.remote_key.clone(), record);
    }

    pub fn get(&self, remote_key: &RemoteKey) -> Option<RemoteRecord> {
        self.state().records.get(remote_key).cloned()
    }

    pub fn records(&self, record_type: RecordType) -> Vec<RemoteRecord> {
        self.state()
            .records
            .values()
            .filter(|record| record.record_type == record_type)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().records.is_empty()
    }

    pub fn fetch_calls(&self, record_type: RecordType) -> usize {
        self.state()
            .fetch_calls
            .get(&record_type)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_fetch_calls(&self) -> usize {
        self.state().fetch_calls.values().sum()
    }

    pub fn save_calls(&self) -> usize {
        self.state().save_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.state().delete_calls
    }

    pub fn batch_calls(&self) -> usize {
        self.state().batch_calls
    }

    pub fn availability_calls(&self) -> usize {
        self.state().availability_calls
    }
}

#[async_trait]
impl RemoteStore for MemoryRecordStore {
    async fn check_availability(&self) -> Availability {
        self.simulate_latency().await;
        let mut state = self.state();
        state.availability_calls += 1;
        if !state.reachable {
            return Availability::Unavailable(UnavailableReason::CouldNotDetermine);
        }
        state.availability
    }

    async fn fetch(
        &self,
        record_type: RecordType,
        query: Option<&RecordQuery>,
    ) -> Result<Vec<RemoteRecord>, RemoteError> {
        self.simulate_latency().await;
        let mut state = self.state();
        *state.fetch_calls.entry(record_type).or_default() += 1;
        if let Some(err) = state.offline_error() {
            return Err(err);
        }
        if let Some(err) = state.fetch_failures.get(&record_type) {
            return Err(err.clone());
        }
        Ok(state
            .records
            .values()
            .filter(|record| record.record_type == record_type)
            .filter(|record| matches_query(record, query))
            .cloned()
            .collect())
    }

    async fn save(&self, record: &RemoteRecord) -> Result<(), RemoteError> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.save_calls += 1;
        let scripted = if state.reachable {
            state.scripted_saves.pop_front()
        } else {
            None
        };
        state.apply_save(record, scripted)
    }

    async fn delete(&self, remote_key: &RemoteKey) -> Result<(), RemoteError> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.delete_calls += 1;
        if let Some(err) = state.offline_error() {
            return Err(err);
        }
        if let Some(err) = state.scripted_deletes.pop_front() {
            return Err(err);
        }
        if let Some(err) = state.key_failures.get(remote_key) {
            return Err(err.clone());
        }
        match state.records.remove(remote_key) {
            Some(_) => Ok(()),
            None => Err(RemoteError::RecordNotFound(remote_key.clone())),
        }
    }

    async fn batch_save(&self, records: &[RemoteRecord]) -> Vec<PerRecordResult> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.batch_calls += 1;
        records
            .iter()
            .map(|record| PerRecordResult {
                remote_key: record.remote_key.clone(),
                result: state.apply_save(record, None),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use clientfolio_core::entities::{ClientProfile, MonthlyAssetRecord, SyncableEntity};
    use clientfolio_core::sync::SyncErrorKind;
    use uuid::Uuid;

    fn asset_record(client_id: Uuid) -> RemoteRecord {
        MonthlyAssetRecord::new(client_id, NaiveDate::from_ymd_opt(2026, 3, 31).unwrap())
            .to_record()
    }

    #[tokio::test]
    async fn fetch_filters_by_type_and_client() {
        let store = MemoryRecordStore::new();
        let alice = ClientProfile::new("Alice", "alice@example.com");
        let bob = ClientProfile::new("Bob", "bob@example.com");
        store.insert(alice.to_record());
        store.insert(bob.to_record());
        store.insert(asset_record(alice.id));
        store.insert(asset_record(bob.id));

        let profiles = store
            .fetch(RecordType::ClientProfile, Some(&RecordQuery::for_client(alice.id)))
            .await
            .expect("fetch profiles");
        assert_eq!(profiles, vec![alice.to_record()]);

        let assets = store
            .fetch(RecordType::MonthlyAssetRecord, Some(&RecordQuery::for_client(bob.id)))
            .await
            .expect("fetch assets");
        assert_eq!(assets.len(), 1);
        assert_eq!(store.fetch_calls(RecordType::MonthlyAssetRecord), 1);
    }

    #[tokio::test]
    async fn unreachable_store_fails_every_call() {
        let store = MemoryRecordStore::new();
        let record = ClientProfile::new("Alice", "alice@example.com").to_record();
        store.set_reachable(false);

        assert_eq!(
            store.save(&record).await.expect_err("offline").kind(),
            SyncErrorKind::NetworkUnavailable
        );
        assert!(store.fetch(RecordType::ClientProfile, None).await.is_err());
        assert!(!store.check_availability().await.is_available());
        assert!(store.is_empty());
        assert_eq!(store.save_calls(), 1);

        store.set_reachable(true);
        store.save(&record).await.expect("online again");
        assert_eq!(store.get(&record.remote_key), Some(record));
    }

    #[tokio::test]
    async fn scripted_and_keyed_failures() {
        let store = MemoryRecordStore::new();
        let record = ClientProfile::new("Alice", "alice@example.com").to_record();
        store.fail_next_save(RemoteError::malformed("rejected"));

        assert!(store.save(&record).await.is_err());
        store.save(&record).await.expect("script consumed");

        store.fail_key(&record.remote_key, RemoteError::QuotaExceeded("full".into()));
        let results = store.batch_save(&[record.clone()]).await;
        assert_eq!(
            results[0].result.as_ref().map_err(RemoteError::kind),
            Err(SyncErrorKind::QuotaExceeded)
        );

        store.clear_key_failure(&record.remote_key);
        store.delete(&record.remote_key).await.expect("delete");
        assert_eq!(
            store.delete(&record.remote_key).await,
            Err(RemoteError::RecordNotFound(record.remote_key.clone()))
        );
    }
}
