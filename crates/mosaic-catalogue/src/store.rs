use std::collections::BTreeSet;
use std::sync::Arc;

use mosaic_manifest::ResourceId;

use crate::error::StoreError;
use crate::record::{CatalogueRecord, LocalInstance};

pub type StoreResult<T> = Result<T, StoreError>;
pub type DynCatalogue = Arc<dyn CatalogueStore>;

/// Outcome of a uniqueness-checked insert.
///
/// `Exists` carries the row that won, so a caller that lost a creation
/// race adopts the winner without a second lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inserted<T> {
    Created(T),
    Exists(T),
}

impl<T> Inserted<T> {
    pub fn already_existed(&self) -> bool {
        matches!(self, Inserted::Exists(_))
    }
}

/// Durable catalogue storage.
///
/// Implementations must make both inserts safe under arbitrary concurrent
/// invocation: for a given key exactly one caller observes `Created`, all
/// others `Exists` with the winning row. `grant` applies the record grant
/// and the optional instance grant as one unit: both or neither.
pub trait CatalogueStore: Send + Sync {
    fn find_record(&self, id: &ResourceId) -> StoreResult<Option<CatalogueRecord>>;
    fn insert_record(&self, record: CatalogueRecord) -> StoreResult<Inserted<CatalogueRecord>>;

    fn find_instance(&self, uri: &str) -> StoreResult<Option<LocalInstance>>;
    fn insert_instance(&self, instance: LocalInstance) -> StoreResult<Inserted<LocalInstance>>;

    /// Idempotent entitlement add on the record and, when `instance_uri`
    /// is given, on that instance, atomically.
    fn grant(&self, id: &ResourceId, instance_uri: Option<&str>, user: &str) -> StoreResult<()>;

    /// Idempotent entitlement removal from the record. `Ok(false)` when
    /// the user was not in the set; `UnknownRecord` when the id is.
    fn revoke(&self, id: &ResourceId, user: &str) -> StoreResult<bool>;

    fn record_users(&self, id: &ResourceId) -> StoreResult<BTreeSet<String>>;
    fn instance_users(&self, uri: &str) -> StoreResult<BTreeSet<String>>;
}
