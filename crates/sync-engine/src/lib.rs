//! Sync manager for client portfolio records.
//!
//! [`SyncManager`] owns the local cache and the offline queue, refreshes every
//! record type concurrently, routes failed writes to the queue and follows the
//! host's lifecycle through a [`LifecycleBus`].

mod config;
mod manager;
mod runtime;
mod scheduler;
mod signals;


pub use config::{SyncConfig, API_URL_ENV, DB_PATH_ENV, REQUEST_TIMEOUT_ENV, SYNC_INTERVAL_ENV};
pub use manager::{LegacyImportReport, SyncManager};
pub use runtime::{Restored, SyncIndicators, SyncRuntimeState};
pub use signals::{LifecycleBus, LifecycleEvent};
