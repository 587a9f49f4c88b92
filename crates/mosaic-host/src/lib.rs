//! HTTP host for the Mosaic local catalogue: input-shape normalization,
//! remote content fetching and the axum surface over the registration
//! engine.

pub mod config;
pub mod fetch;
pub mod http;
pub mod ingest;
pub mod server;

pub use config::HostConfig;
pub use fetch::{ContentFetcher, FetchError, HttpFetcher, StaticFetcher};
pub use http::{router, AppState};
pub use ingest::{Coordinator, IngestError, Upload};
pub use server::serve;
