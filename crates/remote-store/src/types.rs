//! Wire types for the record store REST API.

use clientfolio_core::entities::{RecordType, RemoteKey, RemoteRecord};
use clientfolio_core::sync::{Availability, UnavailableReason};
use log::warn;
use serde::{Deserialize, Serialize};

/// Error body returned by the record store on non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub error: String,
    pub code: String,
    pub message: String,
}

/// GET /api/v1/account/status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatusResponse {
    /// `available` or `unavailable`.
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl AccountStatusResponse {
    pub fn to_availability(&self) -> Availability {
        if self.status.eq_ignore_ascii_case("available") {
            return Availability::Available;
        }
        let reason = match self.reason.as_deref() {
            Some("no_account") => UnavailableReason::NoAccount,
            Some("restricted") => UnavailableReason::Restricted,
            Some("temporarily_unavailable") => UnavailableReason::TemporarilyUnavailable,
            _ => UnavailableReason::CouldNotDetermine,
        };
        Availability::Unavailable(reason)
    }
}

/// GET /api/v1/records/{recordType}
///
/// Records stay raw here so one bad entry cannot fail the whole page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordListResponse {
    pub records: Vec<serde_json::Value>,
}

impl RecordListResponse {
    /// Decodes each record on its own, skipping the ones that do not parse.
    pub fn into_records(self, record_type: RecordType) -> Vec<RemoteRecord> {
        let total = self.records.len();
        let records: Vec<RemoteRecord> = self
            .records
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<RemoteRecord>(raw) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(
                        "[RecordStore] Skipping malformed {} record: {}",
                        record_type.as_str(),
                        err
                    );
                    None
                }
            })
            .collect();
        if records.len() < total {
            warn!(
                "[RecordStore] Skipped {} of {} {} records",
                total - records.len(),
                total,
                record_type.as_str()
            );
        }
        records
    }
}

/// POST /api/v1/records/batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSaveRequest {
    pub records: Vec<RemoteRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub remote_key: RemoteKey,
    /// HTTP-equivalent status for this record.
    pub status: u16,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSaveResponse {
    pub results: Vec<BatchItemResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}
