use std::sync::Arc;

use mosaic_catalogue::{Engine, EngineError, Registered, Submission};
use mosaic_manifest::{parse_manifest, ArchiveError, ManifestError, PackageArchive};
use thiserror::Error;
use url::Url;

use crate::fetch::{ContentFetcher, FetchError};

/// The three input shapes a registration request can arrive in.
#[derive(Debug)]
pub enum Upload {
    /// Package archive from a multipart file field.
    PackageFile(Vec<u8>),
    /// Package archive from a raw octet-stream body.
    PackageStream(Vec<u8>),
    /// Reference to a remote document, packaged or bare.
    Remote {
        url: String,
        packaged: bool,
        force_create: bool,
    },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("missing {0}")]
    MissingInput(&'static str),
    #[error("'{url}' is not a valid URL: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Normalizes every input shape into one `(descriptor, content,
/// archive?)` submission and drives the registration engine with it.
pub struct Coordinator {
    engine: Engine,
    fetcher: Arc<dyn ContentFetcher>,
}

impl Coordinator {
    pub fn new(engine: Engine, fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self { engine, fetcher }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub async fn ingest(&self, upload: Upload, user: &str) -> Result<Registered, IngestError> {
        let (submission, force_create) = self.normalize(upload).await?;
        tracing::info!(
            resource = %submission.descriptor.id,
            user,
            force_create,
            "ingesting resource"
        );
        Ok(self.engine.register(submission, user, force_create)?)
    }

    async fn normalize(&self, upload: Upload) -> Result<(Submission, bool), IngestError> {
        match upload {
            Upload::PackageFile(bytes) => {
                if bytes.is_empty() {
                    return Err(IngestError::MissingInput("file to upload"));
                }
                Ok((package_submission(bytes, None)?, false))
            }
            Upload::PackageStream(bytes) => {
                if bytes.is_empty() {
                    return Err(IngestError::MissingInput("request body"));
                }
                Ok((package_submission(bytes, None)?, false))
            }
            Upload::Remote {
                url,
                packaged,
                force_create,
            } => {
                let url = url.trim().to_string();
                if url.is_empty() {
                    return Err(IngestError::MissingInput("url or template_uri"));
                }
                Url::parse(&url).map_err(|err| IngestError::InvalidUrl {
                    url: url.clone(),
                    reason: err.to_string(),
                })?;
                let bytes = self.fetcher.fetch(&url).await?;
                let submission = if packaged {
                    package_submission(bytes, Some(url))?
                } else {
                    let descriptor = parse_manifest(&bytes)?.with_source(url.clone());
                    Submission::template(descriptor, url)
                };
                Ok((submission, force_create))
            }
        }
    }
}

/// Wrap raw bytes as an addressable package, pull the manifest out of it
/// and keep the handle for materialization.
fn package_submission(bytes: Vec<u8>, source: Option<String>) -> Result<Submission, IngestError> {
    let archive = PackageArchive::open(bytes)?;
    let manifest = archive.manifest_bytes()?;
    let mut descriptor = parse_manifest(&manifest)?;
    if let Some(source) = source {
        descriptor = descriptor.with_source(source);
    }
    Ok(Submission::package(descriptor, archive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticFetcher;
    use mosaic_catalogue::{FsDeployer, MemCatalogue};
    use std::io::{Cursor, Write as _};
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn manifest_json(kind: &str) -> Vec<u8> {
        serde_json::json!({
            "schema": 1,
            "vendor": "acme",
            "name": "clock",
            "version": "1.0",
            "kind": kind,
            "uri": "acme/clock/1.0",
            "contents": { "entry": "index.html" },
        })
        .to_string()
        .into_bytes()
    }

    fn package_bytes() -> Vec<u8> {
        let manifest = manifest_json("widget");
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.start_file("manifest.json", options).expect("start");
        zip.write_all(&manifest).expect("write");
        zip.start_file("index.html", options).expect("start");
        zip.write_all(b"<html></html>").expect("write");
        zip.finish().expect("finish").into_inner()
    }

    fn coordinator(fetcher: StaticFetcher) -> (Coordinator, TempDir) {
        let dir = TempDir::new().expect("tmp");
        let engine = Engine::new(
            Arc::new(MemCatalogue::new()),
            Arc::new(FsDeployer::new(dir.path())),
        );
        (Coordinator::new(engine, Arc::new(fetcher)), dir)
    }

    #[tokio::test]
    async fn uploads_are_registered_without_any_fetch() {
        let (coordinator, _dir) = coordinator(StaticFetcher::default());
        let registered = coordinator
            .ingest(Upload::PackageFile(package_bytes()), "u1")
            .await
            .expect("ingest");
        assert_eq!(registered.description["type"], "widget");
        assert!(registered.created_instance);
    }

    #[tokio::test]
    async fn raw_streams_are_treated_as_packages() {
        let (coordinator, _dir) = coordinator(StaticFetcher::default());
        let registered = coordinator
            .ingest(Upload::PackageStream(package_bytes()), "u1")
            .await
            .expect("ingest");
        assert_eq!(registered.description["type"], "widget");
    }

    #[tokio::test]
    async fn remote_bare_reference_registers_a_template_resource() {
        let url = "https://repo.example/clock.json";
        let (coordinator, _dir) =
            coordinator(StaticFetcher::default().with(url, manifest_json("mashup")));
        let registered = coordinator
            .ingest(
                Upload::Remote {
                    url: url.into(),
                    packaged: false,
                    force_create: false,
                },
                "u1",
            )
            .await
            .expect("ingest");
        assert_eq!(registered.description["type"], "mashup");
        assert!(!registered.created_instance);
    }

    #[tokio::test]
    async fn remote_packaged_reference_keeps_the_archive() {
        let url = "https://repo.example/clock.wgt";
        let (coordinator, _dir) = coordinator(StaticFetcher::default().with(url, package_bytes()));
        let registered = coordinator
            .ingest(
                Upload::Remote {
                    url: url.into(),
                    packaged: true,
                    force_create: false,
                },
                "u1",
            )
            .await
            .expect("ingest");
        assert_eq!(registered.description["type"], "widget");
        assert!(registered.created_instance);
    }

    #[tokio::test]
    async fn missing_inputs_fail_before_any_fetch() {
        let (coordinator, _dir) = coordinator(StaticFetcher::default());
        let err = coordinator
            .ingest(Upload::PackageFile(Vec::new()), "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingInput(_)));

        let err = coordinator
            .ingest(
                Upload::Remote {
                    url: "  ".into(),
                    packaged: false,
                    force_create: false,
                },
                "u1",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingInput(_)));

        let err = coordinator
            .ingest(
                Upload::Remote {
                    url: "not a url".into(),
                    packaged: false,
                    force_create: false,
                },
                "u1",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn unreachable_remote_content_is_an_upstream_error() {
        let (coordinator, _dir) = coordinator(StaticFetcher::default());
        let err = coordinator
            .ingest(
                Upload::Remote {
                    url: "https://repo.example/missing.json".into(),
                    packaged: false,
                    force_create: false,
                },
                "u1",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Fetch(_)));
    }

    #[tokio::test]
    async fn malformed_manifests_are_parse_errors() {
        let url = "https://repo.example/broken.json";
        let (coordinator, _dir) =
            coordinator(StaticFetcher::default().with(url, b"<not json>".to_vec()));
        let err = coordinator
            .ingest(
                Upload::Remote {
                    url: url.into(),
                    packaged: false,
                    force_create: false,
                },
                "u1",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Manifest(_)));
    }
}
