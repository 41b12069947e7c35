//! In-memory entity cache with durable per-type persistence.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, error, warn};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::entities::{Entity, RecordType};
use crate::storage::BlobStore;

/// Storage key holding the persisted collection for `record_type`.
pub fn cache_storage_key(record_type: RecordType) -> &'static str {
    match record_type {
        RecordType::ClientProfile => "cache.client_profiles.v1",
        RecordType::MonthlyAssetRecord => "cache.monthly_asset_records.v1",
        RecordType::BondHolding => "cache.bond_holdings.v1",
        RecordType::StructuredProduct => "cache.structured_products.v1",
    }
}

/// Ids whose local state must survive a refresh because the offline queue
/// still owes the remote store a write for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingOverlay {
    /// Pending create/update: keep the cached optimistic value.
    pub retained: HashSet<Uuid>,
    /// Pending delete: keep it out of the collection.
    pub removed: HashSet<Uuid>,
}

impl PendingOverlay {
    pub fn is_empty(&self) -> bool {
        self.retained.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
struct Collections {
    by_type: HashMap<RecordType, Vec<Entity>>,
    /// Bumped on every local mutation and every finished live write.
    generation: u64,
    /// Generation of the last local change per id, cleared by a refresh of its type.
    touched: HashMap<Uuid, (RecordType, u64)>,
    /// Ids with a remote write in flight, counted per concurrent writer.
    in_flight: HashMap<Uuid, usize>,
}

impl Collections {
    fn touch(&mut self, record_type: RecordType, id: Uuid) {
        self.generation += 1;
        self.touched.insert(id, (record_type, self.generation));
    }

    /// Whether the local state of `id` is newer than a fetch begun at `since`.
    fn is_local_newer(&self, id: &Uuid, since: u64) -> bool {
        self.in_flight.contains_key(id)
            || self
                .touched
                .get(id)
                .is_some_and(|(_, generation)| *generation > since)
    }

    fn collection_mut(&mut self, record_type: RecordType) -> &mut Vec<Entity> {
        self.by_type.entry(record_type).or_default()
    }

    fn collection(&self, record_type: RecordType) -> &[Entity] {
        self.by_type
            .get(&record_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

fn sort_collection(collection: &mut [Entity]) {
    collection.sort_by(|a, b| a.order(b));
}

/// Marks a remote write for one entity as in flight until dropped.
///
/// While it lives, and for any refresh whose fetch began before it dropped,
/// the cached value of the entity wins over fetched data.
#[must_use = "the write stops being tracked when dropped"]
pub struct LiveWrite<'a> {
    cache: &'a LocalCache,
    record_type: RecordType,
    id: Uuid,
}

impl Drop for LiveWrite<'_> {
    fn drop(&mut self) {
        let mut collections = self.cache.write();
        if let Some(count) = collections.in_flight.get_mut(&self.id) {
            *count -= 1;
            if *count == 0 {
                collections.in_flight.remove(&self.id);
            }
        }
        collections.touch(self.record_type, self.id);
    }
}

/// Per-type ordered collections of synchronized entities.
///
/// Every mutation runs under one async writer lock held across the in-memory
/// change and its persistence, so mutations never interleave and persisted
/// blobs are written in mutation order. Readers take a short read lock and
/// always see a fully sorted collection.
pub struct LocalCache {
    collections: RwLock<Collections>,
    writer: Mutex<()>,
    blob_store: Option<Arc<dyn BlobStore>>,
}

impl LocalCache {
    /// Cache without durable persistence.
    pub fn in_memory() -> Self {
        Self {
            collections: RwLock::new(Collections::default()),
            writer: Mutex::new(()),
            blob_store: None,
        }
    }

    /// Opens a cache backed by `blob_store`, reloading every persisted collection.
    ///
    /// A collection that fails to decode is logged and starts empty; the other
    /// types still load.
    pub fn open(blob_store: Arc<dyn BlobStore>) -> Self {
        let mut collections = Collections::default();
        for record_type in RecordType::ALL {
            let key = cache_storage_key(record_type);
            let loaded = match blob_store.load(key) {
                Ok(Some(bytes)) => match serde_json::from_slice::<Vec<Entity>>(&bytes) {
                    Ok(entities) => entities,
                    Err(err) => {
                        error!("[SyncCache] Discarding undecodable {} cache: {}", key, err);
                        Vec::new()
                    }
                },
                Ok(None) => Vec::new(),
                Err(err) => {
                    warn!("[SyncCache] Failed to read {} cache: {}", key, err);
                    Vec::new()
                }
            };

            let mut seen = HashSet::new();
            let mut entities: Vec<Entity> = loaded
                .into_iter()
                .filter(|entity| entity.record_type() == record_type)
                .filter(|entity| seen.insert(entity.id()))
                .collect();
            sort_collection(&mut entities);
            debug!(
                "[SyncCache] Loaded {} cached {} records",
                entities.len(),
                record_type
            );
            collections.by_type.insert(record_type, entities);
        }

        Self {
            collections: RwLock::new(collections),
            writer: Mutex::new(()),
            blob_store: Some(blob_store),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Collections> {
        // A poisoned lock still holds a settled collection: writers never panic
        // between mutation and re-sort.
        self.collections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collections> {
        self.collections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts or replaces `entity` by id and re-sorts its collection.
    ///
    /// Returns the value it replaced.
    pub async fn upsert(&self, entity: Entity) -> Option<Entity> {
        let _writer = self.writer.lock().await;
        let record_type = entity.record_type();
        let (previous, snapshot) = {
            let mut collections = self.write();
            collections.touch(record_type, entity.id());
            let collection = collections.collection_mut(record_type);
            let previous = match collection.iter().position(|e| e.id() == entity.id()) {
                Some(index) => Some(std::mem::replace(&mut collection[index], entity)),
                None => {
                    collection.push(entity);
                    None
                }
            };
            sort_collection(collection);
            (previous, collection.clone())
        };
        self.persist(record_type, &snapshot).await;
        previous
    }

    /// Removes the entity with `id` from whichever collection holds it.
    pub async fn remove(&self, id: Uuid) -> Option<Entity> {
        let _writer = self.writer.lock().await;
        let (removed, snapshot) = {
            let mut collections = self.write();
            let mut found = None;
            for collection in collections.by_type.values_mut() {
                if let Some(index) = collection.iter().position(|e| e.id() == id) {
                    found = Some((collection.remove(index), collection.clone()));
                    break;
                }
            }
            match found {
                Some((removed, snapshot)) => {
                    collections.touch(removed.record_type(), id);
                    (Some(removed), Some(snapshot))
                }
                None => (None, None),
            }
        };
        if let (Some(entity), Some(snapshot)) = (&removed, snapshot) {
            self.persist(entity.record_type(), &snapshot).await;
        }
        removed
    }

    /// Current mutation generation. Capture it before fetching and pass it
    /// to [`replace_collection`](Self::replace_collection).
    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Starts tracking a remote write of `id`.
    pub fn begin_live_write(&self, record_type: RecordType, id: Uuid) -> LiveWrite<'_> {
        *self.write().in_flight.entry(id).or_insert(0) += 1;
        LiveWrite {
            cache: self,
            record_type,
            id,
        }
    }

    /// Replaces the `record_type` collection with entities fetched from a
    /// request begun at generation `since`.
    ///
    /// Local state wins for ids changed after `since` or still being written
    /// remotely: a cached value is kept and an absent one stays absent. The
    /// queue overlay from `pending` is evaluated under the writer lock; ids in
    /// `retained` keep their cached value and ids in `removed` are left out.
    /// Returns the resulting collection size.
    pub async fn replace_collection(
        &self,
        record_type: RecordType,
        fetched: Vec<Entity>,
        since: u64,
        pending: impl FnOnce() -> PendingOverlay,
    ) -> usize {
        let _writer = self.writer.lock().await;
        let overlay = pending();
        let snapshot = {
            let mut collections = self.write();
            let keep_local = |id: &Uuid| {
                overlay.retained.contains(id) || collections.is_local_newer(id, since)
            };

            let current = collections.collection(record_type);
            let mut next: Vec<Entity> = current
                .iter()
                .filter(|e| keep_local(&e.id()))
                .cloned()
                .collect();
            let mut seen: HashSet<Uuid> = next.iter().map(Entity::id).collect();
            for entity in fetched {
                if entity.record_type() != record_type
                    || overlay.removed.contains(&entity.id())
                    || keep_local(&entity.id())
                {
                    continue;
                }
                if seen.insert(entity.id()) {
                    next.push(entity);
                }
            }
            sort_collection(&mut next);
            collections
                .touched
                .retain(|_, (touched_type, _)| *touched_type != record_type);
            *collections.collection_mut(record_type) = next.clone();
            next
        };
        let size = snapshot.len();
        self.persist(record_type, &snapshot).await;
        size
    }

    async fn persist(&self, record_type: RecordType, snapshot: &[Entity]) {
        let Some(blob_store) = self.blob_store.as_ref() else {
            return;
        };
        let key = cache_storage_key(record_type);
        let bytes = match serde_json::to_vec(snapshot) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("[SyncCache] Failed to encode {} cache: {}", key, err);
                return;
            }
        };
        if let Err(err) = blob_store.store(key, bytes).await {
            warn!("[SyncCache] Failed to persist {} cache: {}", key, err);
        }
    }

    /// Ordered snapshot of one collection.
    pub fn by_type(&self, record_type: RecordType) -> Vec<Entity> {
        self.read().collection(record_type).to_vec()
    }

    /// Ordered snapshot of the `record_type` entities owned by `client_id`.
    ///
    /// For `ClientProfile` this is the profile itself.
    pub fn by_client(&self, client_id: Uuid, record_type: RecordType) -> Vec<Entity> {
        self.read()
            .collection(record_type)
            .iter()
            .filter(|e| e.client_id() == client_id)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Option<Entity> {
        self.read()
            .by_type
            .values()
            .flat_map(|collection| collection.iter())
            .find(|e| e.id() == id)
            .cloned()
    }

    pub fn len(&self, record_type: RecordType) -> usize {
        self.read().collection(record_type).len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().by_type.values().all(Vec::is_empty)
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::in_memory()
    }
}
