//! Database model for persisted sync blobs.

use diesel::prelude::*;

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone)]
#[diesel(primary_key(storage_key))]
#[diesel(table_name = crate::schema::sync_blobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncBlobDB {
    pub storage_key: String,
    pub payload: Vec<u8>,
    pub updated_at: String,
}
