use std::fmt;

use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Closed set of resource kinds the catalogue understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Widget,
    Mashup,
    Operator,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Widget => "widget",
            ResourceKind::Mashup => "mashup",
            ResourceKind::Operator => "operator",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "widget" => Some(ResourceKind::Widget),
            "mashup" => Some(ResourceKind::Mashup),
            "operator" => Some(ResourceKind::Operator),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `(vendor, name, version)` triple that uniquely identifies a
/// catalogue record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub vendor: String,
    pub name: String,
    pub version: Version,
}

impl ResourceId {
    pub fn new(vendor: impl Into<String>, name: impl Into<String>, version: Version) -> Self {
        Self {
            vendor: vendor.into(),
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.vendor, self.name, self.version)
    }
}

/// Structured identity and metadata extracted from one manifest document.
///
/// Transient: produced by [`crate::parse_manifest`], consumed within one
/// registration request. The `source` location is attached by the caller
/// that knows where the document came from; parsing itself never sets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub id: ResourceId,
    pub kind: ResourceKind,
    /// Canonical URI, globally unique per installable widget instance.
    pub uri: String,
    /// Where the manifest/content originated (remote URL), if known.
    pub source: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Declared main content path inside the package (widgets).
    pub entry: Option<String>,
}

impl Descriptor {
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}
