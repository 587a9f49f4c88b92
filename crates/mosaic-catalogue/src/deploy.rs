use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mosaic_manifest::{Descriptor, PackageArchive};

use crate::error::DeployError;

pub type DynDeployer = Arc<dyn InstanceDeployer>;

/// Result of materializing a widget artifact.
#[derive(Debug, Clone)]
pub struct Deployment {
    /// Hex sha256 of the package bytes; absent for template deployments.
    pub checksum: Option<String>,
    pub description: serde_json::Value,
}

/// Materializes the installable artifact for a widget instance.
///
/// Read-only with respect to the catalogue; implementations only touch
/// their own artifact storage.
pub trait InstanceDeployer: Send + Sync {
    fn deploy_package(
        &self,
        package: &PackageArchive,
        descriptor: &Descriptor,
    ) -> Result<Deployment, DeployError>;

    fn deploy_template(
        &self,
        template_uri: &str,
        descriptor: &Descriptor,
    ) -> Result<Deployment, DeployError>;
}

/// Unpacks packages under `<root>/<vendor>/<name>/<version>/`.
#[derive(Debug, Clone)]
pub struct FsDeployer {
    root: PathBuf,
}

impl FsDeployer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn instance_dir(&self, descriptor: &Descriptor) -> PathBuf {
        self.root
            .join(&descriptor.id.vendor)
            .join(&descriptor.id.name)
            .join(descriptor.id.version.as_str())
    }

    /// Files are written create-new; a file already present from an
    /// earlier, abandoned deployment of the same bytes is left alone.
    fn write_once(path: &Path, bytes: &[u8]) -> Result<(), DeployError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                file.write_all(bytes).map_err(|e| io_error(path, e))?;
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(err) => Err(io_error(path, err)),
        }
    }
}

fn io_error(path: impl Into<PathBuf>, err: std::io::Error) -> DeployError {
    DeployError::Io {
        path: path.into(),
        source: err,
    }
}

fn ensure_safe_entry(entry: &str) -> Result<(), DeployError> {
    let unsafe_entry = entry.starts_with('/')
        || entry.contains('\\')
        || entry
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if unsafe_entry {
        return Err(DeployError::UnsafeEntry(entry.to_string()));
    }
    Ok(())
}

impl InstanceDeployer for FsDeployer {
    fn deploy_package(
        &self,
        package: &PackageArchive,
        descriptor: &Descriptor,
    ) -> Result<Deployment, DeployError> {
        let dir = self.instance_dir(descriptor);
        let mut files = 0usize;
        for entry in package.entries() {
            if entry.ends_with('/') {
                continue;
            }
            ensure_safe_entry(entry)?;
            let bytes = package.file_bytes(entry)?;
            Self::write_once(&dir.join(entry), &bytes)?;
            files += 1;
        }
        tracing::debug!(uri = %descriptor.uri, files, "deployed package instance");
        Ok(Deployment {
            checksum: Some(package.checksum().to_string()),
            description: serde_json::json!({
                "entry": descriptor.entry,
                "files": files,
            }),
        })
    }

    fn deploy_template(
        &self,
        template_uri: &str,
        descriptor: &Descriptor,
    ) -> Result<Deployment, DeployError> {
        // Template instances reference their document; the content was
        // already fetched upstream and nothing is unpacked locally.
        tracing::debug!(uri = %descriptor.uri, template = template_uri, "recorded template instance");
        Ok(Deployment {
            checksum: None,
            description: serde_json::json!({
                "entry": descriptor.entry,
                "template_uri": template_uri,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_manifest::parse_manifest;
    use std::io::{Cursor, Write as _};
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn package(files: &[(&str, &[u8])]) -> PackageArchive {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (path, bytes) in files {
            zip.start_file(*path, options).expect("start file");
            zip.write_all(bytes).expect("write file");
        }
        PackageArchive::open(zip.finish().expect("finish").into_inner()).expect("open")
    }

    fn descriptor() -> Descriptor {
        parse_manifest(
            serde_json::json!({
                "schema": 1,
                "vendor": "acme",
                "name": "clock",
                "version": "1.0",
                "kind": "widget",
                "uri": "acme/clock/1.0",
                "contents": { "entry": "index.html" },
            })
            .to_string()
            .as_bytes(),
        )
        .expect("descriptor")
    }

    #[test]
    fn unpacks_package_members_under_the_instance_dir() {
        let dir = TempDir::new().expect("tmp");
        let deployer = FsDeployer::new(dir.path());
        let package = package(&[
            ("manifest.json", br#"{"schema":1}"#),
            ("index.html", b"<html></html>"),
            ("js/widget.js", b"console.log('hi')"),
        ]);

        let deployment = deployer.deploy_package(&package, &descriptor()).expect("deploy");
        assert_eq!(deployment.checksum.as_deref(), Some(package.checksum()));

        let base = dir.path().join("acme/clock/1.0");
        assert_eq!(fs::read(base.join("index.html")).expect("read"), b"<html></html>");
        assert_eq!(
            fs::read(base.join("js/widget.js")).expect("read"),
            b"console.log('hi')"
        );
    }

    #[test]
    fn redeploying_identical_bytes_is_tolerated() {
        let dir = TempDir::new().expect("tmp");
        let deployer = FsDeployer::new(dir.path());
        let package = package(&[("index.html", b"<html></html>")]);
        deployer.deploy_package(&package, &descriptor()).expect("first");
        deployer.deploy_package(&package, &descriptor()).expect("second");
    }

    #[test]
    fn entries_escaping_the_root_are_rejected() {
        let dir = TempDir::new().expect("tmp");
        let deployer = FsDeployer::new(dir.path());
        let package = package(&[("../evil.js", b"boom")]);
        let err = deployer.deploy_package(&package, &descriptor()).unwrap_err();
        assert!(matches!(err, DeployError::UnsafeEntry(entry) if entry == "../evil.js"));
    }

    #[test]
    fn template_deployment_records_the_document_location() {
        let dir = TempDir::new().expect("tmp");
        let deployer = FsDeployer::new(dir.path());
        let deployment = deployer
            .deploy_template("https://repo.example/clock.json", &descriptor())
            .expect("deploy");
        assert_eq!(deployment.checksum, None);
        assert_eq!(
            deployment.description["template_uri"],
            "https://repo.example/clock.json"
        );
    }
}
