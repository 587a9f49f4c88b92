use serde::Deserialize;
use thiserror::Error;

use crate::descriptor::{Descriptor, ResourceId, ResourceKind};
use crate::version::Version;

/// The manifest schema revision this parser understands.
pub const SUPPORTED_SCHEMA: u64 = 1;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest is not a valid JSON document: {0}")]
    Syntax(#[from] serde_json::Error),
    #[error("unsupported manifest schema {found} (supported: {SUPPORTED_SCHEMA})")]
    Schema { found: u64 },
    #[error("manifest field '{0}' is missing or empty")]
    MissingField(&'static str),
    #[error("manifest field '{field}' is invalid: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    schema: Option<u64>,
    vendor: Option<String>,
    name: Option<String>,
    version: Option<String>,
    kind: Option<String>,
    uri: Option<String>,
    title: Option<String>,
    description: Option<String>,
    contents: Option<RawContents>,
}

#[derive(Debug, Deserialize)]
struct RawContents {
    entry: Option<String>,
}

/// Parse a manifest document into a [`Descriptor`].
///
/// Pure and deterministic: the same bytes always yield the same descriptor.
/// Everything downstream operates on the descriptor, never on manifest text.
pub fn parse_manifest(bytes: &[u8]) -> Result<Descriptor, ManifestError> {
    let raw: RawManifest = serde_json::from_slice(bytes)?;

    let schema = raw.schema.ok_or(ManifestError::MissingField("schema"))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(ManifestError::Schema { found: schema });
    }

    let vendor = required(raw.vendor, "vendor")?;
    let name = required(raw.name, "name")?;
    let version_raw = required(raw.version, "version")?;
    let version = Version::parse(&version_raw).map_err(|err| ManifestError::InvalidField {
        field: "version",
        reason: err.to_string(),
    })?;
    let kind_raw = required(raw.kind, "kind")?;
    let kind = ResourceKind::from_str(&kind_raw).ok_or_else(|| ManifestError::InvalidField {
        field: "kind",
        reason: format!("unknown resource kind '{kind_raw}'"),
    })?;
    let uri = required(raw.uri, "uri")?;

    let entry = raw
        .contents
        .and_then(|c| c.entry)
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());
    if kind == ResourceKind::Widget && entry.is_none() {
        return Err(ManifestError::MissingField("contents.entry"));
    }

    Ok(Descriptor {
        id: ResourceId::new(vendor, name, version),
        kind,
        uri,
        source: None,
        title: raw.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        description: raw
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        entry,
    })
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ManifestError> {
    let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
    if value.is_empty() {
        return Err(ManifestError::MissingField(field));
    }
    Ok(value)
}
