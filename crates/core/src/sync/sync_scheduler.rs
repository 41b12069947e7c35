//! Core scheduler constants for the sync engine.

/// Periodic refresh cadence while the remote store is available.
pub const SYNC_FOREGROUND_INTERVAL_SECS: u64 = 30;

/// Per-call timeout applied at the remote store boundary.
pub const SYNC_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Capacity of the lifecycle signal channel.
pub const SYNC_LIFECYCLE_CHANNEL_CAPACITY: usize = 32;

/// Storage key of the persisted offline mutation queue.
pub const PENDING_MUTATIONS_STORAGE_KEY: &str = "sync.pending_mutations.v1";
