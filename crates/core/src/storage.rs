//! Durable key/blob storage used to persist the cache and the offline queue.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::errors::{Error, Result};

/// Blob storage keyed by fixed storage keys.
///
/// Reads are synchronous; writes go through the implementation's single writer.
#[async_trait]
pub trait BlobStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn store(&self, key: &str, value: Vec<u8>) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local blob store; contents do not survive a restart of the process
/// but do survive re-opening caches and queues over the same instance.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        match self.blobs.read() {
            Ok(blobs) => blobs.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| Error::storage("memory blob store lock poisoned"))?;
        Ok(blobs.get(key).cloned())
    }

    async fn store(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| Error::storage("memory blob store lock poisoned"))?;
        blobs.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| Error::storage("memory blob store lock poisoned"))?;
        blobs.remove(key);
        Ok(())
    }
}
