//! Typed financial records synchronized with the remote record store.

mod asset_record;
mod bond_holding;
mod client_profile;
mod fields;
mod structured_product;

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use asset_record::*;
pub use bond_holding::*;
pub use client_profile::*;
pub use fields::*;
pub use structured_product::*;

/// Fixed tag identifying an entity kind on the wire and in queue entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordType {
    ClientProfile,
    MonthlyAssetRecord,
    BondHolding,
    StructuredProduct,
}

impl RecordType {
    /// Every synchronized kind, in refresh fan-out order.
    pub const ALL: [RecordType; 4] = [
        RecordType::ClientProfile,
        RecordType::MonthlyAssetRecord,
        RecordType::BondHolding,
        RecordType::StructuredProduct,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::ClientProfile => "ClientProfile",
            RecordType::MonthlyAssetRecord => "MonthlyAssetRecord",
            RecordType::BondHolding => "BondHolding",
            RecordType::StructuredProduct => "StructuredProduct",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary key of a record in the remote store, derived 1:1 from the entity id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteKey(String);

impl RemoteKey {
    pub fn from_id(id: Uuid) -> Self {
        Self(id.hyphenated().to_string())
    }

    /// Wraps a key received from the remote store without validation.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recovers the entity id; `None` for keys not minted by `from_id`.
    pub fn to_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.0).ok()
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record as the remote store sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    pub record_type: RecordType,
    pub remote_key: RemoteKey,
    pub fields: FieldBag,
}

/// Capability shared by every synchronized record kind.
pub trait SyncableEntity: Sized + Clone {
    const RECORD_TYPE: RecordType;

    fn id(&self) -> Uuid;

    fn remote_key(&self) -> RemoteKey {
        RemoteKey::from_id(self.id())
    }

    fn to_fields(&self) -> FieldBag;

    /// Returns `None` if a required field is absent or mistyped.
    fn from_fields(remote_key: &RemoteKey, fields: &FieldBag) -> Option<Self>;

    /// Default collection order: `Less` sorts first.
    fn order(&self, other: &Self) -> Ordering;

    fn to_record(&self) -> RemoteRecord {
        RemoteRecord {
            record_type: Self::RECORD_TYPE,
            remote_key: self.remote_key(),
            fields: self.to_fields(),
        }
    }

    fn from_record(record: &RemoteRecord) -> Option<Self> {
        if record.record_type != Self::RECORD_TYPE {
            return None;
        }
        Self::from_fields(&record.remote_key, &record.fields)
    }
}

/// Closed union over the synchronized record kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "recordType", content = "record")]
pub enum Entity {
    ClientProfile(ClientProfile),
    MonthlyAssetRecord(MonthlyAssetRecord),
    BondHolding(BondHolding),
    StructuredProduct(StructuredProduct),
}

impl Entity {
    pub fn record_type(&self) -> RecordType {
        match self {
            Entity::ClientProfile(_) => RecordType::ClientProfile,
            Entity::MonthlyAssetRecord(_) => RecordType::MonthlyAssetRecord,
            Entity::BondHolding(_) => RecordType::BondHolding,
            Entity::StructuredProduct(_) => RecordType::StructuredProduct,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Entity::ClientProfile(e) => e.id,
            Entity::MonthlyAssetRecord(e) => e.id,
            Entity::BondHolding(e) => e.id,
            Entity::StructuredProduct(e) => e.id,
        }
    }

    pub fn remote_key(&self) -> RemoteKey {
        RemoteKey::from_id(self.id())
    }

    /// Owning client for client-scoped kinds; a profile owns itself.
    pub fn client_id(&self) -> Uuid {
        match self {
            Entity::ClientProfile(e) => e.id,
            Entity::MonthlyAssetRecord(e) => e.client_id,
            Entity::BondHolding(e) => e.client_id,
            Entity::StructuredProduct(e) => e.client_id,
        }
    }

    pub fn to_record(&self) -> RemoteRecord {
        match self {
            Entity::ClientProfile(e) => e.to_record(),
            Entity::MonthlyAssetRecord(e) => e.to_record(),
            Entity::BondHolding(e) => e.to_record(),
            Entity::StructuredProduct(e) => e.to_record(),
        }
    }

    pub fn from_record(record: &RemoteRecord) -> Option<Self> {
        match record.record_type {
            RecordType::ClientProfile => {
                ClientProfile::from_record(record).map(Entity::ClientProfile)
            }
            RecordType::MonthlyAssetRecord => {
                MonthlyAssetRecord::from_record(record).map(Entity::MonthlyAssetRecord)
            }
            RecordType::BondHolding => BondHolding::from_record(record).map(Entity::BondHolding),
            RecordType::StructuredProduct => {
                StructuredProduct::from_record(record).map(Entity::StructuredProduct)
            }
        }
    }

    /// Collection order for two entities of the same kind.
    ///
    /// Mixed kinds never share a collection; they fall back to tag order so the
    /// comparison stays total.
    pub fn order(&self, other: &Entity) -> Ordering {
        match (self, other) {
            (Entity::ClientProfile(a), Entity::ClientProfile(b)) => a.order(b),
            (Entity::MonthlyAssetRecord(a), Entity::MonthlyAssetRecord(b)) => a.order(b),
            (Entity::BondHolding(a), Entity::BondHolding(b)) => a.order(b),
            (Entity::StructuredProduct(a), Entity::StructuredProduct(b)) => a.order(b),
            _ => self.record_type().cmp(&other.record_type()),
        }
    }
}

impl From<ClientProfile> for Entity {
    fn from(value: ClientProfile) -> Self {
        Entity::ClientProfile(value)
    }
}

impl From<MonthlyAssetRecord> for Entity {
    fn from(value: MonthlyAssetRecord) -> Self {
        Entity::MonthlyAssetRecord(value)
    }
}

impl From<BondHolding> for Entity {
    fn from(value: BondHolding) -> Self {
        Entity::BondHolding(value)
    }
}

impl From<StructuredProduct> for Entity {
    fn from(value: StructuredProduct) -> Self {
        Entity::StructuredProduct(value)
    }
}

/// Descending by `primary`, ties broken by id ascending.
pub(crate) fn newest_first<K: Ord>(primary: (K, Uuid), other: (K, Uuid)) -> Ordering {
    other.0.cmp(&primary.0).then_with(|| primary.1.cmp(&other.1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn profile(name: &str, day: u32) -> ClientProfile {
        ClientProfile {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            created_at: Utc.with_ymd_and_hms(2026, 1, day, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn record_type_tags_match_wire_contract() {
        let actual = RecordType::ALL
            .iter()
            .map(|kind| serde_json::to_string(kind).expect("serialize record type"))
            .collect::<Vec<_>>();

        assert_eq!(
            actual,
            vec![
                "\"ClientProfile\"",
                "\"MonthlyAssetRecord\"",
                "\"BondHolding\"",
                "\"StructuredProduct\"",
            ]
        );
        for kind in RecordType::ALL {
            assert_eq!(RecordType::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn remote_key_round_trips_to_id() {
        let id = Uuid::new_v4();
        let key = RemoteKey::from_id(id);
        assert_eq!(key.to_id(), Some(id));
        assert_eq!(RemoteKey::new("not-a-uuid").to_id(), None);
    }

    #[test]
    fn entity_deserialize_routes_by_record_type() {
        let alice = profile("Alice", 3);
        let record = Entity::from(alice.clone()).to_record();

        assert_eq!(record.record_type, RecordType::ClientProfile);
        assert_eq!(
            Entity::from_record(&record),
            Some(Entity::ClientProfile(alice))
        );

        let mut mislabelled = record.clone();
        mislabelled.record_type = RecordType::BondHolding;
        assert_eq!(Entity::from_record(&mislabelled), None);
    }

    #[test]
    fn profiles_order_newest_first() {
        let older = Entity::from(profile("Old", 1));
        let newer = Entity::from(profile("New", 2));
        assert_eq!(newer.order(&older), Ordering::Less);
        assert_eq!(older.order(&newer), Ordering::Greater);
    }

    #[test]
    fn client_owned_entities_report_owner() {
        let client_id = Uuid::new_v4();
        let record = MonthlyAssetRecord::new(
            client_id,
            NaiveDate::from_ymd_opt(2026, 2, 1).expect("date"),
        );
        assert_eq!(Entity::from(record).client_id(), client_id);
    }
}
