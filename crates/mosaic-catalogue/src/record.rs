use std::collections::BTreeSet;

use mosaic_manifest::{ResourceId, ResourceKind};

/// How a catalogue record's content arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOrigin {
    /// Uploaded or fetched as a package archive.
    Package,
    /// Fetched as a bare template document from this URL.
    Template(String),
}

/// Durable record: this exact version of this resource is known.
///
/// Created once per id and never mutated afterwards, except for the user
/// set. The core never deletes records; revoking the last user leaves the
/// record in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogueRecord {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub uri: String,
    pub origin: RecordOrigin,
    /// Serialized description payload, opaque to the registration core.
    pub description: serde_json::Value,
    pub users: BTreeSet<String>,
}

/// Where a local instance's artifact came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceSource {
    Package,
    Template(String),
}

/// Durable, directly installable materialization of a widget, keyed by
/// canonical URI. Created at most once per URI; its lifetime is
/// independent of any single catalogue record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInstance {
    pub uri: String,
    pub source: InstanceSource,
    /// Hex sha256 of the package bytes; absent for template instances.
    pub checksum: Option<String>,
    pub description: serde_json::Value,
    pub users: BTreeSet<String>,
}
