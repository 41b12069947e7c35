//! Sync domain models: queue entries, cycle state and status snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SyncErrorKind;
use crate::entities::{FieldBag, RecordType, RemoteKey, RemoteRecord};
use crate::errors::Result;

/// Supported queued operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOperation {
    Create,
    Update,
    Delete,
}

/// One write that could not reach the remote store yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    pub queue_id: String,
    pub remote_key: RemoteKey,
    pub record_type: RecordType,
    pub operation: MutationOperation,
    /// JSON-encoded field bag; absent for deletes.
    #[serde(with = "payload_base64")]
    pub payload: Option<Vec<u8>>,
    pub enqueued_at: DateTime<Utc>,
}

impl PendingMutation {
    /// Create or update carrying the full record.
    pub fn upsert(operation: MutationOperation, record: &RemoteRecord) -> Result<Self> {
        Ok(Self {
            queue_id: Uuid::now_v7().to_string(),
            remote_key: record.remote_key.clone(),
            record_type: record.record_type,
            operation,
            payload: Some(serde_json::to_vec(&record.fields)?),
            enqueued_at: Utc::now(),
        })
    }

    pub fn delete(record_type: RecordType, remote_key: RemoteKey) -> Self {
        Self {
            queue_id: Uuid::now_v7().to_string(),
            remote_key,
            record_type,
            operation: MutationOperation::Delete,
            payload: None,
            enqueued_at: Utc::now(),
        }
    }

    /// Rebuilds the remote record for a create/update replay.
    ///
    /// Returns `None` for deletes and for payloads that no longer decode.
    pub fn to_record(&self) -> Option<RemoteRecord> {
        let bytes = self.payload.as_deref()?;
        let fields: FieldBag = serde_json::from_slice(bytes).ok()?;
        Some(RemoteRecord {
            record_type: self.record_type,
            remote_key: self.remote_key.clone(),
            fields,
        })
    }
}

mod payload_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|value| STANDARD.decode(value).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// How a drain call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainStatus {
    /// Every entry present at the start was replayed.
    Completed,
    /// Replay stopped at the first failing entry.
    Halted,
    /// Another drain was already in flight; nothing was replayed.
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub status: DrainStatus,
    pub replayed: usize,
    /// Entries dropped because their payload no longer decodes.
    pub discarded: usize,
    pub remaining: usize,
    pub failed_queue_id: Option<String>,
    pub error: Option<SyncErrorKind>,
}

impl DrainReport {
    pub fn is_complete(&self) -> bool {
        self.status == DrainStatus::Completed
    }
}

/// Trigger source for sync cycles and drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCycleTrigger {
    Startup,
    Foreground,
    Periodic,
    Reconnect,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Fetching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// At least one record type refreshed.
    Completed,
    /// Every record type failed.
    Failed,
}

/// Result of one per-type fetch inside a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeFetchResult {
    pub record_type: RecordType,
    /// Entities now cached for this type, or `None` when the fetch failed.
    pub refreshed: Option<usize>,
    /// Remote records skipped because they failed to decode.
    pub skipped: usize,
    pub error: Option<SyncErrorKind>,
}

impl TypeFetchResult {
    pub fn is_success(&self) -> bool {
        self.refreshed.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchAllReport {
    pub trigger: SyncCycleTrigger,
    /// `None` when the call was coalesced into an in-flight cycle.
    pub outcome: Option<CycleOutcome>,
    pub types: Vec<TypeFetchResult>,
    pub duration_ms: i64,
}

impl FetchAllReport {
    pub fn coalesced(trigger: SyncCycleTrigger) -> Self {
        Self {
            trigger,
            outcome: None,
            types: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn is_coalesced(&self) -> bool {
        self.outcome.is_none()
    }

    pub fn result_for(&self, record_type: RecordType) -> Option<&TypeFetchResult> {
        self.types.iter().find(|r| r.record_type == record_type)
    }
}

/// What happened to a save once it left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    Synced,
    /// Parked in the offline queue; the cache holds the optimistic value.
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    /// Parked in the offline queue; the cache already reflects the delete.
    Pending,
}

/// Lightweight sync status for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_account_available: bool,
    pub is_network_reachable: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub cycle_state: CycleState,
    pub last_cycle_outcome: Option<CycleOutcome>,
    pub last_error: Option<SyncErrorKind>,
    pub pending_mutations: usize,
    pub timer_running: bool,
}
