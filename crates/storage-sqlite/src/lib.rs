//! SQLite persistence for the sync cache and offline queue.

pub mod blobs;
pub mod db;
pub mod errors;
pub mod schema;

pub use blobs::{SqliteBlobStore, SyncBlobDB};
pub use db::write_actor::WriteHandle;
pub use errors::StorageError;
