//! Format boundary for packaged application resources: descriptor types,
//! version ordering, manifest parsing and package-archive reading.

mod archive;
mod descriptor;
mod parse;
mod version;

pub use archive::{ArchiveError, PackageArchive, MANIFEST_PATH};
pub use descriptor::{Descriptor, ResourceId, ResourceKind};
pub use parse::{parse_manifest, ManifestError, SUPPORTED_SCHEMA};
pub use version::{Version, VersionError};
