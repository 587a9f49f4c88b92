use std::path::PathBuf;

use mosaic_manifest::{ArchiveError, ResourceId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("i/o error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store lock poisoned")]
    Poisoned,
    #[error("unknown record {0}")]
    UnknownRecord(ResourceId),
    #[error("unknown local instance '{0}'")]
    UnknownInstance(String),
    #[error("corrupt catalogue row: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("package entry '{0}' escapes the deployment root")]
    UnsafeEntry(String),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("i/o error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Deploy(#[from] DeployError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A racing request materialized the instance first. Surfaced, not
    /// silently reused: materialization has filesystem side effects.
    #[error("local instance '{0}' already exists")]
    InstanceConflict(String),
    /// The record is package-backed but this request carried no package.
    #[error("resource '{0}' requires a package upload to materialize")]
    PackageRequired(String),
    #[error("unknown resource {0}")]
    UnknownResource(ResourceId),
}
