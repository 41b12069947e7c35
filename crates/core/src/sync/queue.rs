//! Durable FIFO log of writes that have not reached the remote store yet.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use super::cache::PendingOverlay;
use super::remote::{RemoteError, RemoteStore};
use super::sync_model::{DrainReport, DrainStatus, MutationOperation, PendingMutation};
use super::sync_scheduler::PENDING_MUTATIONS_STORAGE_KEY;
use crate::entities::{RecordType, RemoteKey};
use crate::storage::BlobStore;

enum Replay {
    Applied,
    Discarded,
}

/// Ordered queue of pending mutations.
///
/// Entries leave the queue only after a successful replay. A drain replays in
/// `enqueued_at` order and stops at the first failure, so the failed entry and
/// everything behind it stay queued for the next drain.
pub struct OfflineQueue {
    entries: RwLock<Vec<PendingMutation>>,
    writer: Mutex<()>,
    drain_lock: Mutex<()>,
    blob_store: Option<Arc<dyn BlobStore>>,
}

impl OfflineQueue {
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            writer: Mutex::new(()),
            drain_lock: Mutex::new(()),
            blob_store: None,
        }
    }

    /// Opens the queue persisted in `blob_store`, resuming any pending entries.
    pub fn open(blob_store: Arc<dyn BlobStore>) -> Self {
        let mut entries = match blob_store.load(PENDING_MUTATIONS_STORAGE_KEY) {
            Ok(Some(bytes)) => match serde_json::from_slice::<Vec<PendingMutation>>(&bytes) {
                Ok(entries) => entries,
                Err(err) => {
                    error!(
                        "[SyncQueue] Discarding undecodable pending mutations: {}",
                        err
                    );
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("[SyncQueue] Failed to read pending mutations: {}", err);
                Vec::new()
            }
        };
        entries.sort_by_key(|entry| entry.enqueued_at);
        if !entries.is_empty() {
            info!(
                "[SyncQueue] Resuming with {} pending mutations",
                entries.len()
            );
        }

        Self {
            entries: RwLock::new(entries),
            writer: Mutex::new(()),
            drain_lock: Mutex::new(()),
            blob_store: Some(blob_store),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<PendingMutation>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<PendingMutation>> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends `mutation` and persists the queue.
    pub async fn enqueue(&self, mutation: PendingMutation) {
        let _writer = self.writer.lock().await;
        debug!(
            "[SyncQueue] Enqueue {:?} {} {}",
            mutation.operation, mutation.record_type, mutation.remote_key
        );
        let snapshot = {
            let mut entries = self.write();
            entries.push(mutation);
            entries.clone()
        };
        self.persist(&snapshot).await;
    }

    async fn dequeue(&self, queue_id: &str) {
        let _writer = self.writer.lock().await;
        let snapshot = {
            let mut entries = self.write();
            entries.retain(|entry| entry.queue_id != queue_id);
            entries.clone()
        };
        self.persist(&snapshot).await;
    }

    async fn persist(&self, snapshot: &[PendingMutation]) {
        let Some(blob_store) = self.blob_store.as_ref() else {
            return;
        };
        let bytes = match serde_json::to_vec(snapshot) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("[SyncQueue] Failed to encode pending mutations: {}", err);
                return;
            }
        };
        if let Err(err) = blob_store
            .store(PENDING_MUTATIONS_STORAGE_KEY, bytes)
            .await
        {
            warn!("[SyncQueue] Failed to persist pending mutations: {}", err);
        }
    }

    /// Replays pending mutations against `remote` in order.
    ///
    /// Only one drain runs at a time; a concurrent call returns immediately
    /// with `DrainStatus::AlreadyRunning`. Entries enqueued after the drain
    /// took its snapshot wait for the next drain.
    pub async fn drain(&self, remote: &dyn RemoteStore) -> DrainReport {
        let Ok(_drain_guard) = self.drain_lock.try_lock() else {
            debug!("[SyncQueue] Drain already running; coalescing");
            return DrainReport {
                status: DrainStatus::AlreadyRunning,
                replayed: 0,
                discarded: 0,
                remaining: self.len(),
                failed_queue_id: None,
                error: None,
            };
        };

        let snapshot = self.pending();
        if !snapshot.is_empty() {
            info!("[SyncQueue] Draining {} pending mutations", snapshot.len());
        }

        let mut replayed = 0;
        let mut discarded = 0;
        for entry in snapshot {
            match Self::replay(remote, &entry).await {
                Ok(outcome) => {
                    self.dequeue(&entry.queue_id).await;
                    match outcome {
                        Replay::Applied => replayed += 1,
                        Replay::Discarded => discarded += 1,
                    }
                }
                Err(err) => {
                    let remaining = self.len();
                    warn!(
                        "[SyncQueue] Drain halted at {} ({} {}): {}; {} still pending",
                        entry.queue_id, entry.record_type, entry.remote_key, err, remaining
                    );
                    return DrainReport {
                        status: DrainStatus::Halted,
                        replayed,
                        discarded,
                        remaining,
                        failed_queue_id: Some(entry.queue_id),
                        error: Some(err.kind()),
                    };
                }
            }
        }

        let remaining = self.len();
        if replayed + discarded > 0 {
            info!(
                "[SyncQueue] Drain completed: replayed={} discarded={} remaining={}",
                replayed, discarded, remaining
            );
        }
        DrainReport {
            status: DrainStatus::Completed,
            replayed,
            discarded,
            remaining,
            failed_queue_id: None,
            error: None,
        }
    }

    async fn replay(
        remote: &dyn RemoteStore,
        entry: &PendingMutation,
    ) -> Result<Replay, RemoteError> {
        match entry.operation {
            MutationOperation::Delete => match remote.delete(&entry.remote_key).await {
                Ok(()) => Ok(Replay::Applied),
                Err(err) if err.is_not_found() => {
                    debug!(
                        "[SyncQueue] Delete of {} already applied remotely",
                        entry.remote_key
                    );
                    Ok(Replay::Applied)
                }
                Err(err) => Err(err),
            },
            MutationOperation::Create | MutationOperation::Update => {
                let Some(record) = entry.to_record() else {
                    error!(
                        "[SyncQueue] Dropping {} with undecodable payload",
                        entry.queue_id
                    );
                    return Ok(Replay::Discarded);
                };
                remote.save(&record).await.map(|()| Replay::Applied)
            }
        }
    }

    /// Snapshot of pending entries in replay order.
    pub fn pending(&self) -> Vec<PendingMutation> {
        let mut entries = self.read().clone();
        entries.sort_by_key(|entry| entry.enqueued_at);
        entries
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn has_pending_for(&self, remote_key: &RemoteKey) -> bool {
        self.read()
            .iter()
            .any(|entry| &entry.remote_key == remote_key)
    }

    /// Ids of `record_type` whose latest pending operation must be preserved
    /// across a refresh.
    pub fn pending_overlay(&self, record_type: RecordType) -> PendingOverlay {
        let mut overlay = PendingOverlay::default();
        for entry in self.pending() {
            if entry.record_type != record_type {
                continue;
            }
            let Some(id) = entry.remote_key.to_id() else {
                continue;
            };
            match entry.operation {
                MutationOperation::Delete => {
                    overlay.retained.remove(&id);
                    overlay.removed.insert(id);
                }
                MutationOperation::Create | MutationOperation::Update => {
                    overlay.removed.remove(&id);
                    overlay.retained.insert(id);
                }
            }
        }
        overlay
    }
}

impl Default for OfflineQueue {
    fn default() -> Self {
        Self::in_memory()
    }
}
