//! Sync manager: refresh fan-out, optimistic writes and queue routing.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use clientfolio_core::entities::{Entity, RecordType, RemoteKey, RemoteRecord};
use clientfolio_core::legacy::{asset_record_from_legacy, bond_from_legacy};
use clientfolio_core::secrets::SecretStore;
use clientfolio_core::storage::BlobStore;
use clientfolio_core::sync::{
    Availability, CycleOutcome, CycleState, DeleteOutcome, DrainReport, DrainStatus,
    FetchAllReport, LocalCache, MutationOperation, OfflineQueue, PendingMutation, RemoteError,
    RemoteStore, SaveOutcome, SyncCycleTrigger, SyncErrorKind, SyncStatus, TypeFetchResult,
};
use clientfolio_core::{Error, Result};

use crate::config::{SyncConfig, API_URL_ENV};
use crate::runtime::{Restored, SyncRuntimeState};
use crate::signals::{LifecycleBus, LifecycleEvent};

/// Outcome of a legacy row import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyImportReport {
    pub assets: usize,
    pub bonds: usize,
    pub synced: usize,
    pub pending: usize,
    pub failed: usize,
}

/// Per-entity routing decided before the batch call.
enum BatchPlan {
    Rejected(Error),
    Done(Result<SaveOutcome>),
    Live {
        entity_id: Uuid,
        record: RemoteRecord,
        operation: MutationOperation,
        previous: Option<Entity>,
    },
}

/// Owns the cache and the offline queue; the only writer of either.
pub struct SyncManager {
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) cache: Arc<LocalCache>,
    pub(crate) queue: Arc<OfflineQueue>,
    pub(crate) bus: LifecycleBus,
    pub(crate) runtime: Arc<SyncRuntimeState>,
    pub(crate) config: SyncConfig,
}

impl SyncManager {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        cache: Arc<LocalCache>,
        queue: Arc<OfflineQueue>,
        config: SyncConfig,
    ) -> Self {
        Self {
            remote,
            cache,
            queue,
            bus: LifecycleBus::new(),
            runtime: Arc::new(SyncRuntimeState::new()),
            config,
        }
    }

    /// Manager whose cache and queue live only in memory.
    pub fn in_memory(remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        Self::new(
            remote,
            Arc::new(LocalCache::in_memory()),
            Arc::new(OfflineQueue::in_memory()),
            config,
        )
    }

    /// Manager resuming the cache and queue persisted in `blob_store`.
    pub fn open(
        remote: Arc<dyn RemoteStore>,
        blob_store: Arc<dyn BlobStore>,
        config: SyncConfig,
    ) -> Self {
        Self::new(
            remote,
            Arc::new(LocalCache::open(Arc::clone(&blob_store))),
            Arc::new(OfflineQueue::open(blob_store)),
            config,
        )
    }

    /// Wires the HTTP record store and blob store described by `config`.
    pub fn from_config(config: SyncConfig, secrets: Arc<dyn SecretStore>) -> Result<Self> {
        let remote = config
            .remote_store(secrets)
            .ok_or_else(|| Error::validation(format!("{} is not set", API_URL_ENV)))?;
        let blob_store = config.blob_store()?;
        Ok(Self::open(remote, blob_store, config))
    }

    pub fn cache(&self) -> &Arc<LocalCache> {
        &self.cache
    }

    pub fn queue(&self) -> &Arc<OfflineQueue> {
        &self.queue
    }

    /// Channel the host publishes lifecycle events on.
    pub fn bus(&self) -> &LifecycleBus {
        &self.bus
    }

    pub fn runtime(&self) -> &Arc<SyncRuntimeState> {
        &self.runtime
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Refresh
    // ─────────────────────────────────────────────────────────────────────────

    /// Manually triggered full refresh.
    pub async fn fetch_all(&self) -> FetchAllReport {
        self.run_cycle(SyncCycleTrigger::Manual).await
    }

    /// Fetches every record type concurrently and applies each result as it
    /// arrives. A failed type keeps its cached collection.
    ///
    /// Returns a coalesced report without fetching if a cycle is in flight.
    pub async fn run_cycle(&self, trigger: SyncCycleTrigger) -> FetchAllReport {
        let Ok(_cycle_guard) = self.runtime.cycle_mutex.try_lock() else {
            debug!("[Sync] {:?} refresh coalesced into running cycle", trigger);
            return FetchAllReport::coalesced(trigger);
        };
        let started_at = Instant::now();
        self.runtime.indicators_mut().cycle_state = CycleState::Fetching;
        debug!("[Sync] {:?} refresh started", trigger);

        let tasks = RecordType::ALL.into_iter().map(|record_type| {
            let remote = Arc::clone(&self.remote);
            let cache = Arc::clone(&self.cache);
            let queue = Arc::clone(&self.queue);
            tokio::spawn(async move { refresh_type(remote, cache, queue, record_type).await })
        });
        let types: Vec<TypeFetchResult> = join_all(tasks)
            .await
            .into_iter()
            .zip(RecordType::ALL)
            .map(|(joined, record_type)| {
                joined.unwrap_or_else(|err| {
                    warn!("[Sync] {} refresh task failed: {}", record_type, err);
                    TypeFetchResult {
                        record_type,
                        refreshed: None,
                        skipped: 0,
                        error: Some(SyncErrorKind::Unknown),
                    }
                })
            })
            .collect();

        let first_error = types.iter().find_map(|result| result.error);
        let outcome = if types.iter().any(TypeFetchResult::is_success) {
            CycleOutcome::Completed
        } else {
            CycleOutcome::Failed
        };
        if outcome == CycleOutcome::Completed && self.note_remote_success().network {
            info!("[Sync] Remote store answered again; network marked reachable");
        }
        {
            let mut indicators = self.runtime.indicators_mut();
            if outcome == CycleOutcome::Completed {
                indicators.last_sync_at = Some(Utc::now());
            }
            indicators.last_error = first_error;
            indicators.last_cycle_outcome = Some(outcome);
            indicators.cycle_state = CycleState::Idle;
        }

        let duration_ms = started_at.elapsed().as_millis() as i64;
        let failed = types.iter().filter(|result| !result.is_success()).count();
        if failed > 0 {
            warn!(
                "[Sync] {:?} refresh finished {:?}: {} of {} types failed in {}ms",
                trigger,
                outcome,
                failed,
                types.len(),
                duration_ms
            );
        } else {
            debug!(
                "[Sync] {:?} refresh completed in {}ms",
                trigger, duration_ms
            );
        }

        FetchAllReport {
            trigger,
            outcome: Some(outcome),
            types,
            duration_ms,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Optimistically caches `entity`, then writes it to the remote store.
    ///
    /// Connectivity and account failures park the write in the offline queue
    /// and return [`SaveOutcome::Pending`]. Any other failure rolls the cache
    /// back and is returned.
    pub async fn save(&self, entity: Entity) -> Result<SaveOutcome> {
        self.check_identity(&entity)?;
        let entity_id = entity.id();
        let record = entity.to_record();
        let _live = self.cache.begin_live_write(record.record_type, entity_id);
        let previous = self.cache.upsert(entity).await;
        let operation = operation_for(&previous);

        if self.should_defer(&record) {
            debug!(
                "[Sync] Queueing {} {} behind pending writes",
                record.record_type, record.remote_key
            );
            return self
                .park_upsert(entity_id, operation, &record, previous)
                .await;
        }

        match self.remote.save(&record).await {
            Ok(()) => {
                self.note_remote_success();
                Ok(SaveOutcome::Synced)
            }
            Err(err) => {
                self.route_save_failure(entity_id, operation, &record, previous, err)
                    .await
            }
        }
    }

    /// Deletes `entity` remotely, then from the cache.
    ///
    /// A record the remote store no longer has counts as deleted.
    pub async fn delete(&self, entity: &Entity) -> Result<DeleteOutcome> {
        let record_type = entity.record_type();
        let remote_key = entity.remote_key();
        let _live = self.cache.begin_live_write(record_type, entity.id());

        if self.should_defer_key(&remote_key) {
            debug!(
                "[Sync] Queueing delete of {} {} behind pending writes",
                record_type, remote_key
            );
            self.queue
                .enqueue(PendingMutation::delete(record_type, remote_key))
                .await;
            self.cache.remove(entity.id()).await;
            return Ok(DeleteOutcome::Pending);
        }

        match self.remote.delete(&remote_key).await {
            Ok(()) => {
                self.note_remote_success();
                self.cache.remove(entity.id()).await;
                Ok(DeleteOutcome::Deleted)
            }
            Err(err) if err.is_not_found() => {
                debug!("[Sync] {} {} already gone remotely", record_type, remote_key);
                self.cache.remove(entity.id()).await;
                Ok(DeleteOutcome::Deleted)
            }
            Err(err) if err.retry_class().is_queueable() => {
                self.runtime.note_remote_failure(err.kind());
                warn!(
                    "[Sync] Delete of {} {} queued: {}",
                    record_type, remote_key, err
                );
                self.queue
                    .enqueue(PendingMutation::delete(record_type, remote_key))
                    .await;
                self.cache.remove(entity.id()).await;
                Ok(DeleteOutcome::Pending)
            }
            Err(err) => {
                self.runtime.note_remote_failure(err.kind());
                warn!(
                    "[Sync] Delete of {} {} rejected: {}",
                    record_type, remote_key, err
                );
                Err(err.into())
            }
        }
    }

    /// Bulk variant of [`save`](Self::save) using one batch call.
    ///
    /// Results are returned in input order.
    pub async fn save_all(&self, entities: Vec<Entity>) -> Vec<Result<SaveOutcome>> {
        let mut plans = Vec::with_capacity(entities.len());
        let mut live_records = Vec::new();
        let mut live_writes = Vec::with_capacity(entities.len());

        for entity in entities {
            if let Err(err) = self.check_identity(&entity) {
                plans.push(BatchPlan::Rejected(err));
                continue;
            }
            let entity_id = entity.id();
            let record = entity.to_record();
            live_writes.push(self.cache.begin_live_write(record.record_type, entity_id));
            let previous = self.cache.upsert(entity).await;
            let operation = operation_for(&previous);

            if self.should_defer(&record) {
                let parked = self
                    .park_upsert(entity_id, operation, &record, previous)
                    .await;
                plans.push(BatchPlan::Done(parked));
            } else {
                live_records.push(record.clone());
                plans.push(BatchPlan::Live {
                    entity_id,
                    record,
                    operation,
                    previous,
                });
            }
        }

        let batch_results = if live_records.is_empty() {
            Vec::new()
        } else {
            debug!("[Sync] Saving {} records in one batch", live_records.len());
            self.remote.batch_save(&live_records).await
        };
        let mut results = batch_results.into_iter();

        let mut outcomes = Vec::with_capacity(plans.len());
        for plan in plans {
            let outcome = match plan {
                BatchPlan::Rejected(err) => Err(err),
                BatchPlan::Done(outcome) => outcome,
                BatchPlan::Live {
                    entity_id,
                    record,
                    operation,
                    previous,
                } => {
                    let result = match results.next() {
                        Some(result) if result.remote_key == record.remote_key => result.result,
                        _ => Err(RemoteError::unknown(format!(
                            "batch result missing for {}",
                            record.remote_key
                        ))),
                    };
                    match result {
                        Ok(()) => {
                            self.note_remote_success();
                            Ok(SaveOutcome::Synced)
                        }
                        Err(err) => {
                            self.route_save_failure(entity_id, operation, &record, previous, err)
                                .await
                        }
                    }
                }
            };
            outcomes.push(outcome);
        }
        drop(live_writes);
        outcomes
    }

    /// Converts legacy positional rows for `client_id` and stores them.
    pub async fn import_legacy<S: AsRef<str>>(
        &self,
        client_id: Uuid,
        asset_rows: &[Vec<S>],
        bond_rows: &[Vec<S>],
    ) -> LegacyImportReport {
        let mut entities: Vec<Entity> = asset_rows
            .iter()
            .map(|row| Entity::from(asset_record_from_legacy(client_id, row)))
            .collect();
        entities.extend(
            bond_rows
                .iter()
                .map(|row| Entity::from(bond_from_legacy(client_id, row))),
        );

        let mut report = LegacyImportReport {
            assets: asset_rows.len(),
            bonds: bond_rows.len(),
            ..LegacyImportReport::default()
        };
        for outcome in self.save_all(entities).await {
            match outcome {
                Ok(SaveOutcome::Synced) => report.synced += 1,
                Ok(SaveOutcome::Pending) => report.pending += 1,
                Err(err) => {
                    warn!("[Sync] Legacy row for {} not imported: {}", client_id, err);
                    report.failed += 1;
                }
            }
        }
        info!(
            "[Sync] Imported legacy data for {}: {} assets, {} bonds ({} synced, {} pending, {} failed)",
            client_id, report.assets, report.bonds, report.synced, report.pending, report.failed
        );
        report
    }

    fn check_identity(&self, entity: &Entity) -> Result<()> {
        let Some(current) = self.cache.get(entity.id()) else {
            return Ok(());
        };
        if current.record_type() != entity.record_type() {
            return Err(Error::validation(format!(
                "{} is cached as {}, not {}",
                entity.id(),
                current.record_type(),
                entity.record_type()
            )));
        }
        if current.client_id() != entity.client_id() {
            return Err(Error::validation(format!(
                "clientId of {} {} cannot change",
                entity.record_type(),
                entity.id()
            )));
        }
        Ok(())
    }

    fn should_defer(&self, record: &RemoteRecord) -> bool {
        self.should_defer_key(&record.remote_key)
    }

    /// Writes skip the live attempt while offline or while the key already
    /// has queued mutations, so queued writes are never overtaken.
    fn should_defer_key(&self, remote_key: &RemoteKey) -> bool {
        !self.runtime.indicators().is_network_reachable || self.queue.has_pending_for(remote_key)
    }

    async fn route_save_failure(
        &self,
        entity_id: Uuid,
        operation: MutationOperation,
        record: &RemoteRecord,
        previous: Option<Entity>,
        err: RemoteError,
    ) -> Result<SaveOutcome> {
        self.runtime.note_remote_failure(err.kind());
        if err.retry_class().is_queueable() {
            warn!(
                "[Sync] Save of {} {} queued: {}",
                record.record_type, record.remote_key, err
            );
            return self
                .park_upsert(entity_id, operation, record, previous)
                .await;
        }
        warn!(
            "[Sync] Save of {} {} rejected; rolling back: {}",
            record.record_type, record.remote_key, err
        );
        self.rollback(entity_id, previous).await;
        Err(err.into())
    }

    async fn park_upsert(
        &self,
        entity_id: Uuid,
        operation: MutationOperation,
        record: &RemoteRecord,
        previous: Option<Entity>,
    ) -> Result<SaveOutcome> {
        match PendingMutation::upsert(operation, record) {
            Ok(mutation) => {
                self.queue.enqueue(mutation).await;
                Ok(SaveOutcome::Pending)
            }
            Err(err) => {
                self.rollback(entity_id, previous).await;
                Err(err)
            }
        }
    }

    async fn rollback(&self, entity_id: Uuid, previous: Option<Entity>) {
        match previous {
            Some(previous) => {
                self.cache.upsert(previous).await;
            }
            None => {
                self.cache.remove(entity_id).await;
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queue and reachability
    // ─────────────────────────────────────────────────────────────────────────

    /// Replays the offline queue now.
    pub async fn retry_pending(&self) -> DrainReport {
        let report = self.queue.drain(self.remote.as_ref()).await;
        match report.status {
            DrainStatus::Completed if report.replayed > 0 => {
                self.note_remote_success();
            }
            DrainStatus::Halted => {
                if let Some(kind) = report.error {
                    self.runtime.note_remote_failure(kind);
                }
            }
            _ => {}
        }
        report
    }

    /// Applies a reachability signal.
    ///
    /// On an unreachable to reachable transition with queued writes, a drain
    /// is spawned and its handle returned.
    pub fn set_network_reachable(
        self: &Arc<Self>,
        reachable: bool,
    ) -> Option<JoinHandle<DrainReport>> {
        let was_reachable = self.runtime.set_network_reachable(reachable);
        if reachable == was_reachable {
            return None;
        }
        if !reachable {
            info!("[Sync] Network unreachable; writes will be queued");
            return None;
        }
        info!("[Sync] Network reachable again");
        if !self.config.drain_on_reconnect || self.queue.is_empty() {
            return None;
        }
        let manager = Arc::clone(self);
        Some(tokio::spawn(async move { manager.retry_pending().await }))
    }

    /// Probes the remote account and records the result.
    pub async fn refresh_availability(&self) -> Availability {
        let availability = self.remote.check_availability().await;
        let was_available = self
            .runtime
            .set_account_available(availability.is_available());
        match availability {
            Availability::Available if !was_available => self.announce_account_available(),
            Availability::Available => debug!("[Sync] Remote account available"),
            Availability::Unavailable(reason) => {
                info!("[Sync] Remote account unavailable: {:?}", reason)
            }
        }
        availability
    }

    fn note_remote_success(&self) -> Restored {
        let restored = self.runtime.note_remote_success();
        if restored.account {
            self.announce_account_available();
        }
        restored
    }

    /// Lets the lifecycle listener start the periodic timer.
    fn announce_account_available(&self) {
        info!("[Sync] Remote account available");
        self.bus.publish(LifecycleEvent::AccountAvailable);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn by_type(&self, record_type: RecordType) -> Vec<Entity> {
        self.cache.by_type(record_type)
    }

    pub fn by_client(&self, client_id: Uuid, record_type: RecordType) -> Vec<Entity> {
        self.cache.by_client(client_id, record_type)
    }

    pub fn get(&self, id: Uuid) -> Option<Entity> {
        self.cache.get(id)
    }

    pub async fn status(&self) -> SyncStatus {
        let indicators = self.runtime.snapshot();
        SyncStatus {
            is_account_available: indicators.is_account_available,
            is_network_reachable: indicators.is_network_reachable,
            last_sync_at: indicators.last_sync_at,
            cycle_state: indicators.cycle_state,
            last_cycle_outcome: indicators.last_cycle_outcome,
            last_error: indicators.last_error,
            pending_mutations: self.queue.len(),
            timer_running: self.runtime.timer_running().await,
        }
    }
}

fn operation_for(previous: &Option<Entity>) -> MutationOperation {
    match previous {
        Some(_) => MutationOperation::Update,
        None => MutationOperation::Create,
    }
}

async fn refresh_type(
    remote: Arc<dyn RemoteStore>,
    cache: Arc<LocalCache>,
    queue: Arc<OfflineQueue>,
    record_type: RecordType,
) -> TypeFetchResult {
    let since = cache.generation();
    match remote.fetch(record_type, None).await {
        Ok(records) => {
            let entities: Vec<Entity> = records.iter().filter_map(Entity::from_record).collect();
            let skipped = records.len() - entities.len();
            if skipped > 0 {
                warn!(
                    "[Sync] Skipped {} undecodable {} records",
                    skipped, record_type
                );
            }
            let size = cache
                .replace_collection(record_type, entities, since, || {
                    queue.pending_overlay(record_type)
                })
                .await;
            debug!("[Sync] {} refreshed: {} cached", record_type, size);
            TypeFetchResult {
                record_type,
                refreshed: Some(size),
                skipped,
                error: None,
            }
        }
        Err(err) => {
            warn!(
                "[Sync] {} fetch failed; keeping cached collection: {}",
                record_type, err
            );
            TypeFetchResult {
                record_type,
                refreshed: None,
                skipped: 0,
                error: Some(err.kind()),
            }
        }
    }
}
