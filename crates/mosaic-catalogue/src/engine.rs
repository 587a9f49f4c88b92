use std::collections::BTreeSet;

use mosaic_manifest::{Descriptor, PackageArchive, ResourceId, ResourceKind};

use crate::deploy::DynDeployer;
use crate::error::{EngineError, StoreError};
use crate::payload;
use crate::record::{CatalogueRecord, InstanceSource, LocalInstance, RecordOrigin};
use crate::store::{DynCatalogue, Inserted};

/// A normalized registration request: one descriptor plus the raw content
/// it was extracted from.
#[derive(Debug)]
pub struct Submission {
    pub descriptor: Descriptor,
    pub body: SubmissionBody,
}

#[derive(Debug)]
pub enum SubmissionBody {
    /// The resource arrived as a package archive; the handle is kept so
    /// widget materialization can unpack it.
    Package(PackageArchive),
    /// The resource arrived as a bare template document from this URL.
    Template { uri: String },
}

impl Submission {
    pub fn package(descriptor: Descriptor, archive: PackageArchive) -> Self {
        Self {
            descriptor,
            body: SubmissionBody::Package(archive),
        }
    }

    pub fn template(descriptor: Descriptor, uri: impl Into<String>) -> Self {
        Self {
            descriptor,
            body: SubmissionBody::Template { uri: uri.into() },
        }
    }
}

/// Outcome of a registration, ready for serialization to the caller.
#[derive(Debug)]
pub struct Registered {
    pub kind: ResourceKind,
    pub description: serde_json::Value,
    pub created_record: bool,
    pub created_instance: bool,
}

/// The registration core: at-most-once record and instance creation with
/// idempotent entitlement tracking.
///
/// Safe under arbitrary concurrent invocation with overlapping
/// identities; the store's uniqueness-checked inserts are the arbiter.
pub struct Engine {
    store: DynCatalogue,
    deployer: DynDeployer,
}

impl Engine {
    pub fn new(store: DynCatalogue, deployer: DynDeployer) -> Self {
        Self { store, deployer }
    }

    pub fn store(&self) -> &DynCatalogue {
        &self.store
    }

    /// Register a resource for `user`.
    ///
    /// Creates the catalogue record and, for widgets, the local instance
    /// when they do not exist yet; otherwise reuses what is already
    /// registered and only grows the entitlement sets. A lost record
    /// creation race is absorbed by adopting the winner. A lost instance
    /// creation race is absorbed too, unless `force_create` demanded a
    /// fresh materialization, in which case it surfaces as a conflict.
    pub fn register(
        &self,
        submission: Submission,
        user: &str,
        force_create: bool,
    ) -> Result<Registered, EngineError> {
        let Submission { descriptor, body } = submission;

        let (record, created_record) = match self.store.find_record(&descriptor.id)? {
            Some(existing) => (existing, false),
            None => self.create_record(&descriptor, &body)?,
        };

        if record.kind != ResourceKind::Widget {
            self.store.grant(&record.id, None, user)?;
            return Ok(Registered {
                kind: record.kind,
                description: payload::record_payload(&record),
                created_record,
                created_instance: false,
            });
        }

        let existing_instance = if force_create {
            None
        } else {
            self.store.find_instance(&record.uri)?
        };
        let (instance, created_instance) = match existing_instance {
            Some(instance) => (instance, false),
            None => self.create_instance(&record, &descriptor, &body, force_create)?,
        };

        self.store.grant(&record.id, Some(&instance.uri), user)?;
        Ok(Registered {
            kind: ResourceKind::Widget,
            description: payload::instance_payload(&record, &instance),
            created_record,
            created_instance,
        })
    }

    /// Remove `user`'s entitlement to the named record. Idempotent with
    /// respect to the user; the record and any instance stay in place.
    pub fn revoke(&self, id: &ResourceId, user: &str) -> Result<(), EngineError> {
        match self.store.revoke(id, user) {
            Ok(removed) => {
                tracing::debug!(resource = %id, user, removed, "revoked entitlement");
                Ok(())
            }
            Err(StoreError::UnknownRecord(id)) => Err(EngineError::UnknownResource(id)),
            Err(err) => Err(err.into()),
        }
    }

    fn create_record(
        &self,
        descriptor: &Descriptor,
        body: &SubmissionBody,
    ) -> Result<(CatalogueRecord, bool), EngineError> {
        let origin = match body {
            SubmissionBody::Package(package) => {
                // Validate the declared content against the archive before
                // anything durable happens.
                if let Some(entry) = &descriptor.entry
                    && !package.contains(entry)
                {
                    return Err(mosaic_manifest::ArchiveError::MissingEntry(entry.clone()).into());
                }
                RecordOrigin::Package
            }
            SubmissionBody::Template { uri } => RecordOrigin::Template(uri.clone()),
        };
        let candidate = CatalogueRecord {
            id: descriptor.id.clone(),
            kind: descriptor.kind,
            uri: descriptor.uri.clone(),
            origin,
            description: payload::describe_descriptor(descriptor),
            users: BTreeSet::new(),
        };
        match self.store.insert_record(candidate)? {
            Inserted::Created(record) => {
                tracing::info!(resource = %record.id, kind = %record.kind, "registered resource");
                Ok((record, true))
            }
            Inserted::Exists(winner) => {
                // Lost the creation race; the winner's record is the record.
                tracing::debug!(resource = %winner.id, "record already registered");
                Ok((winner, false))
            }
        }
    }

    fn create_instance(
        &self,
        record: &CatalogueRecord,
        descriptor: &Descriptor,
        body: &SubmissionBody,
        force_create: bool,
    ) -> Result<(LocalInstance, bool), EngineError> {
        let (source, deployment) = match &record.origin {
            RecordOrigin::Package => match body {
                SubmissionBody::Package(package) => (
                    InstanceSource::Package,
                    self.deployer.deploy_package(package, descriptor)?,
                ),
                SubmissionBody::Template { .. } => {
                    return Err(EngineError::PackageRequired(record.uri.clone()));
                }
            },
            RecordOrigin::Template(template) => (
                InstanceSource::Template(template.clone()),
                self.deployer.deploy_template(template, descriptor)?,
            ),
        };
        let candidate = LocalInstance {
            uri: record.uri.clone(),
            source,
            checksum: deployment.checksum,
            description: deployment.description,
            users: BTreeSet::new(),
        };
        match self.store.insert_instance(candidate)? {
            Inserted::Created(instance) => {
                tracing::info!(uri = %instance.uri, "materialized local instance");
                Ok((instance, true))
            }
            Inserted::Exists(_) if force_create => {
                Err(EngineError::InstanceConflict(record.uri.clone()))
            }
            Inserted::Exists(winner) => {
                // Deployment writes are create-new, so the loser's work
                // converged on the same files; serve the winner's row.
                tracing::debug!(uri = %winner.uri, "instance materialized by a racing request");
                Ok((winner, false))
            }
        }
    }
}
