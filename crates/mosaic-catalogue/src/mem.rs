use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use mosaic_manifest::ResourceId;

use crate::error::StoreError;
use crate::record::{CatalogueRecord, LocalInstance};
use crate::store::{CatalogueStore, Inserted, StoreResult};

/// In-memory catalogue backend for tests and embedded use.
#[derive(Clone, Default)]
pub struct MemCatalogue {
    records: Arc<RwLock<BTreeMap<ResourceId, CatalogueRecord>>>,
    instances: Arc<RwLock<BTreeMap<String, LocalInstance>>>,
}

impl std::fmt::Debug for MemCatalogue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemCatalogue")
            .field("records", &self.records.read().unwrap().len())
            .field("instances", &self.instances.read().unwrap().len())
            .finish()
    }
}

impl MemCatalogue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CatalogueStore for MemCatalogue {
    fn find_record(&self, id: &ResourceId) -> StoreResult<Option<CatalogueRecord>> {
        Ok(self.records.read().unwrap().get(id).cloned())
    }

    fn insert_record(&self, record: CatalogueRecord) -> StoreResult<Inserted<CatalogueRecord>> {
        let mut records = self.records.write().unwrap();
        if let Some(existing) = records.get(&record.id) {
            return Ok(Inserted::Exists(existing.clone()));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(Inserted::Created(record))
    }

    fn find_instance(&self, uri: &str) -> StoreResult<Option<LocalInstance>> {
        Ok(self.instances.read().unwrap().get(uri).cloned())
    }

    fn insert_instance(&self, instance: LocalInstance) -> StoreResult<Inserted<LocalInstance>> {
        let mut instances = self.instances.write().unwrap();
        if let Some(existing) = instances.get(&instance.uri) {
            return Ok(Inserted::Exists(existing.clone()));
        }
        instances.insert(instance.uri.clone(), instance.clone());
        Ok(Inserted::Created(instance))
    }

    fn grant(&self, id: &ResourceId, instance_uri: Option<&str>, user: &str) -> StoreResult<()> {
        // Both write locks up front: verify both targets before touching
        // either set, so a missing instance never leaves a half-applied
        // grant.
        let mut records = self.records.write().unwrap();
        let mut instances = self.instances.write().unwrap();
        if !records.contains_key(id) {
            return Err(StoreError::UnknownRecord(id.clone()));
        }
        if let Some(uri) = instance_uri
            && !instances.contains_key(uri)
        {
            return Err(StoreError::UnknownInstance(uri.to_string()));
        }
        if let Some(record) = records.get_mut(id) {
            record.users.insert(user.to_string());
        }
        if let Some(uri) = instance_uri
            && let Some(instance) = instances.get_mut(uri)
        {
            instance.users.insert(user.to_string());
        }
        Ok(())
    }

    fn revoke(&self, id: &ResourceId, user: &str) -> StoreResult<bool> {
        let mut records = self.records.write().unwrap();
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownRecord(id.clone()))?;
        Ok(record.users.remove(user))
    }

    fn record_users(&self, id: &ResourceId) -> StoreResult<BTreeSet<String>> {
        let records = self.records.read().unwrap();
        let record = records
            .get(id)
            .ok_or_else(|| StoreError::UnknownRecord(id.clone()))?;
        Ok(record.users.clone())
    }

    fn instance_users(&self, uri: &str) -> StoreResult<BTreeSet<String>> {
        let instances = self.instances.read().unwrap();
        let instance = instances
            .get(uri)
            .ok_or_else(|| StoreError::UnknownInstance(uri.to_string()))?;
        Ok(instance.users.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{InstanceSource, RecordOrigin};
    use mosaic_manifest::{ResourceKind, Version};

    fn id(version: &str) -> ResourceId {
        ResourceId::new("acme", "clock", Version::parse(version).unwrap())
    }

    fn record(version: &str) -> CatalogueRecord {
        CatalogueRecord {
            id: id(version),
            kind: ResourceKind::Widget,
            uri: format!("acme/clock/{version}"),
            origin: RecordOrigin::Package,
            description: serde_json::json!({"title": "Clock"}),
            users: BTreeSet::new(),
        }
    }

    fn instance(uri: &str) -> LocalInstance {
        LocalInstance {
            uri: uri.to_string(),
            source: InstanceSource::Package,
            checksum: Some("00".into()),
            description: serde_json::json!({}),
            users: BTreeSet::new(),
        }
    }

    #[test]
    fn second_insert_reports_exists_with_the_winner() {
        let store = MemCatalogue::new();
        assert!(!store.insert_record(record("1.0")).unwrap().already_existed());
        let mut loser = record("1.0");
        loser.description = serde_json::json!({"title": "Other"});
        match store.insert_record(loser).unwrap() {
            Inserted::Exists(winner) => {
                assert_eq!(winner.description, serde_json::json!({"title": "Clock"}));
            }
            Inserted::Created(_) => panic!("duplicate insert must not create"),
        }
    }

    #[test]
    fn grants_are_idempotent_and_atomic_over_the_pair() {
        let store = MemCatalogue::new();
        store.insert_record(record("1.0")).unwrap();
        store.insert_instance(instance("acme/clock/1.0")).unwrap();

        store.grant(&id("1.0"), Some("acme/clock/1.0"), "u1").unwrap();
        store.grant(&id("1.0"), Some("acme/clock/1.0"), "u1").unwrap();
        assert_eq!(store.record_users(&id("1.0")).unwrap().len(), 1);
        assert_eq!(store.instance_users("acme/clock/1.0").unwrap().len(), 1);

        // A grant naming a missing instance leaves the record set alone.
        let err = store.grant(&id("1.0"), Some("acme/clock/9.9"), "u2").unwrap_err();
        assert!(matches!(err, StoreError::UnknownInstance(_)));
        assert!(!store.record_users(&id("1.0")).unwrap().contains("u2"));
    }

    #[test]
    fn revoke_is_idempotent_and_requires_the_record() {
        let store = MemCatalogue::new();
        store.insert_record(record("1.0")).unwrap();
        store.grant(&id("1.0"), None, "u1").unwrap();

        assert!(store.revoke(&id("1.0"), "u1").unwrap());
        assert!(!store.revoke(&id("1.0"), "u1").unwrap());
        assert!(!store.revoke(&id("1.0"), "never-there").unwrap());
        assert!(matches!(
            store.revoke(&id("2.0"), "u1").unwrap_err(),
            StoreError::UnknownRecord(_)
        ));
    }

    #[test]
    fn records_with_equal_release_but_distinct_literals_are_distinct() {
        let store = MemCatalogue::new();
        store.insert_record(record("1.0")).unwrap();
        assert!(!store.insert_record(record("1.0.0")).unwrap().already_existed());
        assert!(store.find_record(&id("1.0")).unwrap().is_some());
        assert!(store.find_record(&id("1.0.0")).unwrap().is_some());
    }
}
