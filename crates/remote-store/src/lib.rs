//! Remote record store implementations for client portfolio sync.
//!
//! - [`HttpRecordStore`]: REST client for the hosted record store.
//! - [`TimeoutStore`]: per-call timeout decorator for any [`RemoteStore`].
//! - [`MemoryRecordStore`]: in-process store with fault injection.
//!
//! [`RemoteStore`]: clientfolio_core::sync::RemoteStore

mod client;
mod error;
mod memory;
mod timeout;
mod types;

pub use client::HttpRecordStore;
pub use error::{RecordStoreError, Result};
pub use memory::MemoryRecordStore;
pub use timeout::TimeoutStore;
pub use types::*;
