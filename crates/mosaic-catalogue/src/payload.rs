//! User-facing description payloads for records and instances.

use mosaic_manifest::Descriptor;
use serde_json::{json, Value};

use crate::record::{CatalogueRecord, LocalInstance};

/// The opaque description stored on a record at creation time.
pub fn describe_descriptor(descriptor: &Descriptor) -> Value {
    json!({
        "title": descriptor.title,
        "summary": descriptor.description,
        "source": descriptor.source,
        "entry": descriptor.entry,
    })
}

/// Response payload for a non-widget registration.
pub fn record_payload(record: &CatalogueRecord) -> Value {
    json!({
        "type": record.kind.as_str(),
        "vendor": record.id.vendor,
        "name": record.id.name,
        "version": record.id.version.as_str(),
        "uri": record.uri,
        "description": record.description,
        "users": record.users,
    })
}

/// Response payload for a widget registration.
pub fn instance_payload(record: &CatalogueRecord, instance: &LocalInstance) -> Value {
    json!({
        "type": "widget",
        "vendor": record.id.vendor,
        "name": record.id.name,
        "version": record.id.version.as_str(),
        "uri": instance.uri,
        "description": record.description,
        "instance": instance.description,
        "checksum": instance.checksum,
        "users": instance.users,
    })
}
