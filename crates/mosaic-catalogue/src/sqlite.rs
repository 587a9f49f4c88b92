use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use mosaic_manifest::{ResourceId, ResourceKind};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::error::StoreError;
use crate::record::{CatalogueRecord, InstanceSource, LocalInstance, RecordOrigin};
use crate::store::{CatalogueStore, Inserted, StoreResult};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    vendor      TEXT NOT NULL,
    name        TEXT NOT NULL,
    version     TEXT NOT NULL,
    kind        TEXT NOT NULL,
    uri         TEXT NOT NULL,
    origin_kind TEXT NOT NULL,
    origin_uri  TEXT,
    description TEXT NOT NULL,
    PRIMARY KEY (vendor, name, version)
);
CREATE TABLE IF NOT EXISTS instances (
    uri         TEXT PRIMARY KEY,
    source_kind TEXT NOT NULL,
    source_uri  TEXT,
    checksum    TEXT,
    description TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS record_users (
    vendor  TEXT NOT NULL,
    name    TEXT NOT NULL,
    version TEXT NOT NULL,
    user    TEXT NOT NULL,
    PRIMARY KEY (vendor, name, version, user)
);
CREATE TABLE IF NOT EXISTS instance_users (
    uri  TEXT NOT NULL,
    user TEXT NOT NULL,
    PRIMARY KEY (uri, user)
);
";

/// SQLite-backed catalogue.
///
/// All access is serialized through an internal `Mutex<Connection>`; the
/// UNIQUE constraints on the record triple and the instance uri are what
/// make concurrent creation converge even across processes.
pub struct SqliteCatalogue {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteCatalogue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCatalogue").finish_non_exhaustive()
    }
}

impl SqliteCatalogue {
    /// Open (or create) the catalogue database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, mainly for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run `f` inside an IMMEDIATE transaction; commit on `Ok`, roll back
    /// on every other exit path.
    fn with_immediate_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn read_record(conn: &Connection, id: &ResourceId) -> StoreResult<Option<CatalogueRecord>> {
        let row = conn
            .query_row(
                "SELECT kind, uri, origin_kind, origin_uri, description FROM records \
                 WHERE vendor = ?1 AND name = ?2 AND version = ?3",
                params![id.vendor, id.name, id.version.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((kind, uri, origin_kind, origin_uri, description)) = row else {
            return Ok(None);
        };

        let kind = ResourceKind::from_str(&kind)
            .ok_or_else(|| StoreError::Corrupt(format!("record {id} has kind '{kind}'")))?;
        let origin = match (origin_kind.as_str(), origin_uri) {
            ("package", _) => RecordOrigin::Package,
            ("template", Some(template)) => RecordOrigin::Template(template),
            (other, _) => {
                return Err(StoreError::Corrupt(format!(
                    "record {id} has origin '{other}'"
                )));
            }
        };
        let description = serde_json::from_str(&description)
            .map_err(|err| StoreError::Corrupt(format!("record {id} description: {err}")))?;

        let mut stmt = conn.prepare(
            "SELECT user FROM record_users WHERE vendor = ?1 AND name = ?2 AND version = ?3",
        )?;
        let users = stmt
            .query_map(params![id.vendor, id.name, id.version.as_str()], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Some(CatalogueRecord {
            id: id.clone(),
            kind,
            uri,
            origin,
            description,
            users,
        }))
    }

    fn read_instance(conn: &Connection, uri: &str) -> StoreResult<Option<LocalInstance>> {
        let row = conn
            .query_row(
                "SELECT source_kind, source_uri, checksum, description FROM instances \
                 WHERE uri = ?1",
                params![uri],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((source_kind, source_uri, checksum, description)) = row else {
            return Ok(None);
        };

        let source = match (source_kind.as_str(), source_uri) {
            ("package", _) => InstanceSource::Package,
            ("template", Some(template)) => InstanceSource::Template(template),
            (other, _) => {
                return Err(StoreError::Corrupt(format!(
                    "instance '{uri}' has source '{other}'"
                )));
            }
        };
        let description = serde_json::from_str(&description)
            .map_err(|err| StoreError::Corrupt(format!("instance '{uri}' description: {err}")))?;

        let mut stmt = conn.prepare("SELECT user FROM instance_users WHERE uri = ?1")?;
        let users = stmt
            .query_map(params![uri], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Some(LocalInstance {
            uri: uri.to_string(),
            source,
            checksum,
            description,
            users,
        }))
    }

    fn record_exists(tx: &Transaction<'_>, id: &ResourceId) -> StoreResult<bool> {
        let found = tx
            .query_row(
                "SELECT 1 FROM records WHERE vendor = ?1 AND name = ?2 AND version = ?3",
                params![id.vendor, id.name, id.version.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn origin_columns(origin: &RecordOrigin) -> (&'static str, Option<&str>) {
    match origin {
        RecordOrigin::Package => ("package", None),
        RecordOrigin::Template(uri) => ("template", Some(uri.as_str())),
    }
}

fn source_columns(source: &InstanceSource) -> (&'static str, Option<&str>) {
    match source {
        InstanceSource::Package => ("package", None),
        InstanceSource::Template(uri) => ("template", Some(uri.as_str())),
    }
}

impl CatalogueStore for SqliteCatalogue {
    fn find_record(&self, id: &ResourceId) -> StoreResult<Option<CatalogueRecord>> {
        let conn = self.lock()?;
        Self::read_record(&conn, id)
    }

    fn insert_record(&self, record: CatalogueRecord) -> StoreResult<Inserted<CatalogueRecord>> {
        let conn = self.lock()?;
        let (origin_kind, origin_uri) = origin_columns(&record.origin);
        let description = record.description.to_string();
        let inserted = conn.execute(
            "INSERT INTO records (vendor, name, version, kind, uri, origin_kind, origin_uri, description) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id.vendor,
                record.id.name,
                record.id.version.as_str(),
                record.kind.as_str(),
                record.uri,
                origin_kind,
                origin_uri,
                description,
            ],
        );
        match inserted {
            Ok(_) => Ok(Inserted::Created(record)),
            Err(err) if is_unique_violation(&err) => {
                let winner = Self::read_record(&conn, &record.id)?.ok_or_else(|| {
                    StoreError::Corrupt(format!("record {} vanished after conflict", record.id))
                })?;
                Ok(Inserted::Exists(winner))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn find_instance(&self, uri: &str) -> StoreResult<Option<LocalInstance>> {
        let conn = self.lock()?;
        Self::read_instance(&conn, uri)
    }

    fn insert_instance(&self, instance: LocalInstance) -> StoreResult<Inserted<LocalInstance>> {
        let conn = self.lock()?;
        let (source_kind, source_uri) = source_columns(&instance.source);
        let description = instance.description.to_string();
        let inserted = conn.execute(
            "INSERT INTO instances (uri, source_kind, source_uri, checksum, description) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                instance.uri,
                source_kind,
                source_uri,
                instance.checksum,
                description,
            ],
        );
        match inserted {
            Ok(_) => Ok(Inserted::Created(instance)),
            Err(err) if is_unique_violation(&err) => {
                let winner = Self::read_instance(&conn, &instance.uri)?.ok_or_else(|| {
                    StoreError::Corrupt(format!(
                        "instance '{}' vanished after conflict",
                        instance.uri
                    ))
                })?;
                Ok(Inserted::Exists(winner))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn grant(&self, id: &ResourceId, instance_uri: Option<&str>, user: &str) -> StoreResult<()> {
        self.with_immediate_tx(|tx| {
            if !Self::record_exists(tx, id)? {
                return Err(StoreError::UnknownRecord(id.clone()));
            }
            if let Some(uri) = instance_uri {
                let found = tx
                    .query_row("SELECT 1 FROM instances WHERE uri = ?1", params![uri], |_| {
                        Ok(())
                    })
                    .optional()?;
                if found.is_none() {
                    return Err(StoreError::UnknownInstance(uri.to_string()));
                }
            }
            tx.execute(
                "INSERT OR IGNORE INTO record_users (vendor, name, version, user) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.vendor, id.name, id.version.as_str(), user],
            )?;
            if let Some(uri) = instance_uri {
                tx.execute(
                    "INSERT OR IGNORE INTO instance_users (uri, user) VALUES (?1, ?2)",
                    params![uri, user],
                )?;
            }
            Ok(())
        })
    }

    fn revoke(&self, id: &ResourceId, user: &str) -> StoreResult<bool> {
        self.with_immediate_tx(|tx| {
            if !Self::record_exists(tx, id)? {
                return Err(StoreError::UnknownRecord(id.clone()));
            }
            let deleted = tx.execute(
                "DELETE FROM record_users WHERE vendor = ?1 AND name = ?2 AND version = ?3 \
                 AND user = ?4",
                params![id.vendor, id.name, id.version.as_str(), user],
            )?;
            Ok(deleted > 0)
        })
    }

    fn record_users(&self, id: &ResourceId) -> StoreResult<BTreeSet<String>> {
        let conn = self.lock()?;
        let record =
            Self::read_record(&conn, id)?.ok_or_else(|| StoreError::UnknownRecord(id.clone()))?;
        Ok(record.users)
    }

    fn instance_users(&self, uri: &str) -> StoreResult<BTreeSet<String>> {
        let conn = self.lock()?;
        let instance = Self::read_instance(&conn, uri)?
            .ok_or_else(|| StoreError::UnknownInstance(uri.to_string()))?;
        Ok(instance.users)
    }
}
