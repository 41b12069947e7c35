use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{newest_first, FieldBag, RecordType, RemoteKey, SyncableEntity};

/// Root entity: one advised client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl ClientProfile {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            created_at: Utc::now(),
        }
    }
}

impl SyncableEntity for ClientProfile {
    const RECORD_TYPE: RecordType = RecordType::ClientProfile;

    fn id(&self) -> Uuid {
        self.id
    }

    fn to_fields(&self) -> FieldBag {
        FieldBag::new()
            .with_text("name", self.name.clone())
            .with_text("email", self.email.clone())
            .with_timestamp("createdAt", self.created_at)
    }

    fn from_fields(remote_key: &RemoteKey, fields: &FieldBag) -> Option<Self> {
        Some(Self {
            id: remote_key.to_id()?,
            name: fields.text("name")?.to_string(),
            email: fields.text_or_empty("email")?,
            created_at: fields.timestamp("createdAt")?,
        })
    }

    fn order(&self, other: &Self) -> Ordering {
        newest_first((self.created_at, self.id), (other.created_at, other.id))
    }
}
