//! Keyed blob persistence backing the sync cache and offline queue.

mod model;
mod repository;

pub use model::SyncBlobDB;
pub use repository::SqliteBlobStore;
