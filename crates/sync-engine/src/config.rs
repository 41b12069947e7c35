//! Sync configuration loaded from the environment.

use std::sync::Arc;
use std::time::Duration;

use log::warn;

use clientfolio_core::secrets::SecretStore;
use clientfolio_core::storage::{BlobStore, MemoryBlobStore};
use clientfolio_core::sync::{
    RemoteStore, SYNC_FOREGROUND_INTERVAL_SECS, SYNC_REQUEST_TIMEOUT_SECS,
};
use clientfolio_core::Result;
use clientfolio_remote_store::{HttpRecordStore, TimeoutStore};
use clientfolio_storage_sqlite::SqliteBlobStore;

pub const API_URL_ENV: &str = "CLIENTFOLIO_API_URL";
pub const SYNC_INTERVAL_ENV: &str = "CLIENTFOLIO_SYNC_INTERVAL_SECS";
pub const REQUEST_TIMEOUT_ENV: &str = "CLIENTFOLIO_REQUEST_TIMEOUT_SECS";
pub const DB_PATH_ENV: &str = "CLIENTFOLIO_DB_PATH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Base URL of the record store API; `None` disables the HTTP store.
    pub api_url: Option<String>,
    pub sync_interval: Duration,
    pub request_timeout: Duration,
    /// SQLite file for the cache and queue; `None` keeps them in memory.
    pub db_path: Option<String>,
    /// Replay the offline queue as soon as reachability is restored.
    pub drain_on_reconnect: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            sync_interval: Duration::from_secs(SYNC_FOREGROUND_INTERVAL_SECS),
            request_timeout: Duration::from_secs(SYNC_REQUEST_TIMEOUT_SECS),
            db_path: None,
            drain_on_reconnect: true,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_secs(name: &str, value: Option<String>, default: Duration) -> Duration {
    let Some(raw) = non_empty(value) else {
        return default;
    };
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Duration::from_secs(secs),
        _ => {
            warn!(
                "[Sync] Ignoring invalid {}={:?}; using {}s",
                name,
                raw,
                default.as_secs()
            );
            default
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            api_url: non_empty(lookup(API_URL_ENV))
                .map(|v| v.trim_end_matches('/').to_string()),
            sync_interval: parse_secs(
                SYNC_INTERVAL_ENV,
                lookup(SYNC_INTERVAL_ENV),
                defaults.sync_interval,
            ),
            request_timeout: parse_secs(
                REQUEST_TIMEOUT_ENV,
                lookup(REQUEST_TIMEOUT_ENV),
                defaults.request_timeout,
            ),
            db_path: non_empty(lookup(DB_PATH_ENV)),
            drain_on_reconnect: defaults.drain_on_reconnect,
        }
    }

    /// HTTP record store bounded by the configured request timeout.
    pub fn remote_store(&self, secrets: Arc<dyn SecretStore>) -> Option<Arc<dyn RemoteStore>> {
        let api_url = self.api_url.as_deref()?;
        let http = HttpRecordStore::with_timeout(api_url, secrets, self.request_timeout);
        Some(Arc::new(TimeoutStore::new(http, self.request_timeout)))
    }

    /// Durable blob store at `db_path`, or an in-memory one when unset.
    pub fn blob_store(&self) -> Result<Arc<dyn BlobStore>> {
        match self.db_path.as_deref() {
            Some(db_path) => Ok(Arc::new(SqliteBlobStore::open(db_path)?)),
            None => Ok(Arc::new(MemoryBlobStore::new())),
        }
    }
}
