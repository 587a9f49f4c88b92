//! The local catalogue: durable records of known packaged resources,
//! at-most-once widget materialization and per-user entitlements.

mod deploy;
mod engine;
mod error;
mod mem;
pub mod payload;
mod record;
mod sqlite;
mod store;

pub use deploy::{Deployment, DynDeployer, FsDeployer, InstanceDeployer};
pub use engine::{Engine, Registered, Submission, SubmissionBody};
pub use error::{DeployError, EngineError, StoreError};
pub use mem::MemCatalogue;
pub use record::{CatalogueRecord, InstanceSource, LocalInstance, RecordOrigin};
pub use sqlite::SqliteCatalogue;
pub use store::{CatalogueStore, DynCatalogue, Inserted, StoreResult};
