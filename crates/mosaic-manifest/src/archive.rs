use std::fmt;
use std::io::{Cursor, Read};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use thiserror::Error;
use zip::ZipArchive;

/// Path of the manifest document inside a package.
pub const MANIFEST_PATH: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("package cannot be opened: {0}")]
    Unreadable(#[source] zip::result::ZipError),
    #[error("package does not contain a '{MANIFEST_PATH}' manifest")]
    MissingManifest,
    #[error("package does not contain '{0}'")]
    MissingEntry(String),
    #[error("package entry '{path}' cannot be read: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// An addressable, read-only view over packaged resource bytes.
///
/// Uploaded files, raw byte streams and fetched bodies all arrive as plain
/// bytes; wrapping them in a cursor gives every input shape the same
/// container. The handle stays usable after manifest extraction so the
/// registration path can deploy from it later.
pub struct PackageArchive {
    zip: Mutex<ZipArchive<Cursor<Vec<u8>>>>,
    entries: Vec<String>,
    checksum: String,
}

impl fmt::Debug for PackageArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageArchive")
            .field("entries", &self.entries.len())
            .field("checksum", &self.checksum)
            .finish()
    }
}

impl PackageArchive {
    pub fn open(bytes: Vec<u8>) -> Result<Self, ArchiveError> {
        let checksum = hex::encode(Sha256::digest(&bytes));
        let zip = ZipArchive::new(Cursor::new(bytes)).map_err(ArchiveError::Unreadable)?;
        let entries = zip.file_names().map(str::to_string).collect();
        Ok(Self {
            zip: Mutex::new(zip),
            entries,
            checksum,
        })
    }

    /// Member paths, in archive order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e == path)
    }

    /// Hex sha256 of the container bytes.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// The bytes of the embedded manifest document.
    pub fn manifest_bytes(&self) -> Result<Vec<u8>, ArchiveError> {
        self.file_bytes(MANIFEST_PATH)
            .map_err(|err| match err {
                ArchiveError::MissingEntry(_) => ArchiveError::MissingManifest,
                other => other,
            })
    }

    /// The bytes of one member file.
    pub fn file_bytes(&self, path: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut zip = self.zip.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = match zip.by_name(path) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(ArchiveError::MissingEntry(path.to_string()));
            }
            Err(err) => return Err(ArchiveError::Unreadable(err)),
        };
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes).map_err(|source| ArchiveError::Read {
            path: path.to_string(),
            source,
        })?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    pub(crate) fn package(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (path, bytes) in files {
            zip.start_file(*path, options).expect("start file");
            zip.write_all(bytes).expect("write file");
        }
        zip.finish().expect("finish").into_inner()
    }

    #[test]
    fn extracts_the_manifest_and_keeps_the_handle_usable() {
        let bytes = package(&[
            (MANIFEST_PATH, br#"{"schema":1}"#),
            ("index.html", b"<html></html>"),
        ]);
        let archive = PackageArchive::open(bytes).expect("open");
        assert_eq!(archive.manifest_bytes().expect("manifest"), br#"{"schema":1}"#);
        // Later deployment reads still work on the same handle.
        assert_eq!(archive.file_bytes("index.html").expect("entry"), b"<html></html>");
        assert!(archive.contains("index.html"));
        assert_eq!(archive.entries().len(), 2);
    }

    #[test]
    fn garbage_bytes_are_unreadable() {
        let err = PackageArchive::open(b"not a zip at all".to_vec()).unwrap_err();
        assert!(matches!(err, ArchiveError::Unreadable(_)));
    }

    #[test]
    fn package_without_manifest_is_rejected() {
        let bytes = package(&[("index.html", b"<html></html>")]);
        let archive = PackageArchive::open(bytes).expect("open");
        assert!(matches!(
            archive.manifest_bytes().unwrap_err(),
            ArchiveError::MissingManifest
        ));
    }

    #[test]
    fn missing_member_is_reported_by_path() {
        let bytes = package(&[(MANIFEST_PATH, b"{}")]);
        let archive = PackageArchive::open(bytes).expect("open");
        match archive.file_bytes("missing.js").unwrap_err() {
            ArchiveError::MissingEntry(path) => assert_eq!(path, "missing.js"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn checksum_is_stable_for_identical_bytes() {
        let bytes = package(&[(MANIFEST_PATH, b"{}")]);
        let a = PackageArchive::open(bytes.clone()).expect("a");
        let b = PackageArchive::open(bytes).expect("b");
        assert_eq!(a.checksum(), b.checksum());
    }
}
