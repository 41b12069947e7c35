use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::debug;

use clientfolio_core::storage::BlobStore;
use clientfolio_core::Result;

use super::model::SyncBlobDB;
use crate::db::{create_pool, get_connection, run_migrations, spawn_writer, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sync_blobs;
use crate::schema::sync_blobs::dsl::*;

/// SQLite-backed [`BlobStore`]; reads go through the pool, writes through the
/// single writer.
pub struct SqliteBlobStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteBlobStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        SqliteBlobStore { pool, writer }
    }

    /// Opens (creating if needed) the database at `db_path` and runs pending
    /// migrations.
    pub fn open(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StorageError::from)?;
            }
        }
        run_migrations(db_path)?;
        let pool = create_pool(db_path)?;
        let writer = spawn_writer(pool.as_ref().clone());
        debug!("[Storage] Opened blob store at {}", db_path);
        Ok(Self::new(pool, writer))
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let mut conn = get_connection(&self.pool)?;
        let stored = sync_blobs
            .select(storage_key)
            .order(storage_key.asc())
            .load::<String>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(stored)
    }
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = get_connection(&self.pool)?;
        let row = sync_blobs
            .find(key)
            .select(SyncBlobDB::as_select())
            .first::<SyncBlobDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(|row| row.payload))
    }

    async fn store(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let row = SyncBlobDB {
            storage_key: key.to_string(),
            payload: value,
            updated_at: Utc::now().to_rfc3339(),
        };
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::insert_into(sync_blobs::table)
                    .values(&row)
                    .on_conflict(storage_key)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::delete(sync_blobs.find(key))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clientfolio_core::entities::{ClientProfile, Entity, RecordType, SyncableEntity};
    use clientfolio_core::sync::{LocalCache, MutationOperation, OfflineQueue, PendingMutation};
    use tempfile::tempdir;

    use crate::db::init;

    fn setup_store() -> SqliteBlobStore {
        let app_data = tempdir()
            .expect("tempdir")
            .keep()
            .to_string_lossy()
            .to_string();
        let db_path = init(&app_data).expect("init db");
        SqliteBlobStore::open(&db_path).expect("open blob store")
    }

    #[tokio::test]
    async fn store_overwrites_and_remove_deletes() {
        let store = setup_store();
        assert_eq!(store.load("k").expect("load"), None);

        store.store("k", b"one".to_vec()).await.expect("store");
        store.store("k", b"two".to_vec()).await.expect("overwrite");
        store.store("other", b"x".to_vec()).await.expect("store other");

        assert_eq!(store.load("k").expect("load"), Some(b"two".to_vec()));
        assert_eq!(store.keys().expect("keys"), vec!["k", "other"]);

        store.remove("k").await.expect("remove");
        assert_eq!(store.load("k").expect("load"), None);
        store.remove("missing").await.expect("remove missing");
    }

    #[tokio::test]
    async fn reopening_right_after_a_drop_finds_the_database_unlocked() {
        let app_data = tempdir()
            .expect("tempdir")
            .keep()
            .to_string_lossy()
            .to_string();
        let db_path = init(&app_data).expect("init db");

        for round in 0..5_u8 {
            let store = SqliteBlobStore::open(&db_path).expect("open");
            store.store("round", vec![round]).await.expect("store");
        }

        let store = SqliteBlobStore::open(&db_path).expect("final open");
        assert_eq!(store.load("round").expect("load"), Some(vec![4]));
    }

    #[tokio::test]
    async fn cache_and_queue_survive_reopen() {
        let app_data = tempdir()
            .expect("tempdir")
            .keep()
            .to_string_lossy()
            .to_string();
        let db_path = init(&app_data).expect("init db");
        let alice = ClientProfile::new("Alice", "alice@example.com");

        {
            let blobs: Arc<dyn BlobStore> =
                Arc::new(SqliteBlobStore::open(&db_path).expect("open"));
            let cache = LocalCache::open(Arc::clone(&blobs));
            let queue = OfflineQueue::open(Arc::clone(&blobs));
            cache.upsert(Entity::from(alice.clone())).await;
            queue
                .enqueue(
                    PendingMutation::upsert(MutationOperation::Create, &alice.to_record())
                        .expect("pending"),
                )
                .await;
        }

        let blobs: Arc<dyn BlobStore> = Arc::new(SqliteBlobStore::open(&db_path).expect("reopen"));
        let cache = LocalCache::open(Arc::clone(&blobs));
        let queue = OfflineQueue::open(blobs);

        assert_eq!(
            cache.by_type(RecordType::ClientProfile),
            vec![Entity::from(alice.clone())]
        );
        assert_eq!(queue.len(), 1);
        assert!(queue.has_pending_for(&alice.remote_key()));
    }
}
