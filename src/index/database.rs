//! SQLite-backed durable store for the file catalog.
//!
//! Every multi-row write runs in one transaction: either the whole batch is
//! committed or, on any statement failure, the transaction is rolled back
//! (on drop) and [`IndexError::TransactionFailure`] is returned.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, Row, Transaction};

use super::record::{FileRecord, HashState};
use super::IndexError;
use crate::scanner::path_utils;
use crate::scanner::ContentHash;

/// Schema version recorded in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS files (
        identity        TEXT PRIMARY KEY,
        path            TEXT NOT NULL,
        extension       TEXT NOT NULL,
        size            INTEGER NOT NULL,
        mod_time        INTEGER NOT NULL,
        hash            TEXT,
        humanized_size  TEXT
    );
    CREATE TABLE IF NOT EXISTS duplicates (
        identity  TEXT PRIMARY KEY
                  REFERENCES files(identity) ON DELETE CASCADE ON UPDATE CASCADE,
        scanned   INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_files_path ON files (path);
    CREATE INDEX IF NOT EXISTS idx_files_size ON files (size);
    CREATE INDEX IF NOT EXISTS idx_files_hash ON files (hash);
";

const RECORD_COLUMNS: &str =
    "f.identity, f.path, f.extension, f.size, f.mod_time, f.hash, f.humanized_size";

/// Durable catalog store.
///
/// The connection is shared behind a mutex; SQLite runs in WAL mode with a
/// busy timeout so readers are not blocked by batched writes.
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

impl Store {
    /// Open or create the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::StoreUnavailable`] if the file cannot be opened
    /// or the schema cannot be created.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        let unavailable = |source: Box<dyn std::error::Error + Send + Sync>| {
            IndexError::StoreUnavailable {
                path: path.to_path_buf(),
                source,
            }
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| unavailable(e.into()))?;
            }
        }

        let existed = path.exists();
        let conn = Connection::open(path).map_err(|e| unavailable(e.into()))?;
        Self::initialize(&conn).map_err(|e| unavailable(e.into()))?;

        if existed {
            log::debug!("Opened index store at {}", path.display());
        } else {
            log::info!("Created index store at {}", path.display());
        }

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::StoreUnavailable`] if SQLite cannot initialize.
    pub fn open_in_memory() -> Result<Self, IndexError> {
        let unavailable = |e: rusqlite::Error| IndexError::StoreUnavailable {
            path: PathBuf::from(":memory:"),
            source: e.into(),
        };
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        Self::initialize(&conn).map_err(unavailable)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    fn initialize(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        conn.execute_batch(SCHEMA)?;
        if version < SCHEMA_VERSION {
            conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
            log::debug!("Index schema initialized (version {})", SCHEMA_VERSION);
        }
        Ok(())
    }

    /// Location of the store file, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, IndexError> {
        self.conn.lock().map_err(|_| IndexError::StorePoisoned)
    }

    /// Run `f` inside a transaction and commit it.
    fn with_transaction<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
    ) -> Result<T, IndexError> {
        let failure = |source| IndexError::TransactionFailure { operation, source };

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(failure)?;
        let value = f(&tx).map_err(failure)?;
        tx.commit().map_err(failure)?;
        Ok(value)
    }

    fn query_records(&self, sql: &str) -> Result<Vec<FileRecord>, IndexError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Every row of the `files` table.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] on SQLite failure.
    pub fn load_all(&self) -> Result<Vec<FileRecord>, IndexError> {
        self.query_records(&format!("SELECT {RECORD_COLUMNS} FROM files f"))
    }

    /// Records with duplicate membership, ordered by size desc then hash.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] on SQLite failure.
    pub fn duplicates(&self) -> Result<Vec<FileRecord>, IndexError> {
        self.query_records(&format!(
            "SELECT {RECORD_COLUMNS} FROM files f \
             INNER JOIN duplicates d ON f.identity = d.identity \
             ORDER BY f.size DESC, f.hash, f.identity"
        ))
    }

    /// Duplicate members except the lowest identity of each (size, hash) set.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] on SQLite failure.
    pub fn rest_of_duplicates(&self) -> Result<Vec<FileRecord>, IndexError> {
        self.query_records(&format!(
            "SELECT {RECORD_COLUMNS} FROM files f \
             INNER JOIN duplicates d ON f.identity = d.identity \
             WHERE f.identity NOT IN ( \
                 SELECT MIN(f2.identity) FROM files f2 \
                 INNER JOIN duplicates d2 ON f2.identity = d2.identity \
                 GROUP BY f2.size, f2.hash \
             ) \
             ORDER BY f.size DESC, f.hash, f.identity"
        ))
    }

    /// Records with a stored hash, ordered by size desc then hash.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] on SQLite failure.
    pub fn hashed(&self) -> Result<Vec<FileRecord>, IndexError> {
        self.query_records(&format!(
            "SELECT {RECORD_COLUMNS} FROM files f \
             WHERE f.hash IS NOT NULL \
             ORDER BY f.size DESC, f.hash, f.identity"
        ))
    }

    /// Identities that currently have duplicate membership.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] on SQLite failure.
    pub fn duplicate_identities(&self) -> Result<Vec<String>, IndexError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT identity FROM duplicates ORDER BY identity")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Insert or replace the stat data of each record.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`]; nothing is written.
    pub fn upsert_records(&self, records: &[FileRecord]) -> Result<usize, IndexError> {
        if records.is_empty() {
            return Ok(0);
        }
        self.with_transaction("add", |tx| {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO files \
                 (identity, path, extension, size, mod_time, hash, humanized_size) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT(identity) DO UPDATE SET \
                     path = excluded.path, \
                     extension = excluded.extension, \
                     size = excluded.size, \
                     mod_time = excluded.mod_time, \
                     hash = excluded.hash, \
                     humanized_size = excluded.humanized_size",
            )?;
            let mut count = 0;
            for record in records {
                count += stmt.execute(params![
                    record.identity,
                    record.path,
                    record.extension,
                    to_sql_size(record.size),
                    record.modified_at,
                    record.content_hash.to_column(),
                    record.human_size,
                ])?;
            }
            Ok(count)
        })
    }

    /// Refresh size, mtime and hash of existing rows.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`]; nothing is written.
    pub fn update_records(&self, records: &[FileRecord]) -> Result<usize, IndexError> {
        if records.is_empty() {
            return Ok(0);
        }
        self.with_transaction("update", |tx| {
            let mut stmt = tx.prepare_cached(
                "UPDATE files SET size = ?1, mod_time = ?2, hash = ?3, humanized_size = ?4 \
                 WHERE identity = ?5",
            )?;
            let mut count = 0;
            for record in records {
                count += stmt.execute(params![
                    to_sql_size(record.size),
                    record.modified_at,
                    record.content_hash.to_column(),
                    record.human_size,
                    record.identity,
                ])?;
            }
            Ok(count)
        })
    }

    /// Store freshly computed hashes.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`]; nothing is written.
    pub fn update_hashes(&self, hashes: &[(String, ContentHash)]) -> Result<usize, IndexError> {
        if hashes.is_empty() {
            return Ok(0);
        }
        self.with_transaction("store hashes", |tx| {
            let mut stmt = tx.prepare_cached("UPDATE files SET hash = ?1 WHERE identity = ?2")?;
            let mut count = 0;
            for (identity, hash) in hashes {
                count += stmt.execute(params![hash.to_string(), identity])?;
            }
            Ok(count)
        })
    }

    /// Delete rows by identity. Membership rows cascade.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`]; nothing is deleted.
    pub fn delete_identities(
        &self,
        operation: &'static str,
        identities: &[String],
    ) -> Result<usize, IndexError> {
        if identities.is_empty() {
            return Ok(0);
        }
        self.with_transaction(operation, |tx| {
            let mut stmt = tx.prepare_cached("DELETE FROM files WHERE identity = ?1")?;
            let mut count = 0;
            for identity in identities {
                count += stmt.execute(params![identity])?;
            }
            Ok(count)
        })
    }

    /// Delete every row whose path is `root` or lies beneath it.
    ///
    /// Prefix matching uses `substr` rather than `LIKE`, which would treat
    /// `%` and `_` in paths as wildcards and ignore ASCII case.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`]; nothing is deleted.
    pub fn delete_path_tree(&self, root: &str) -> Result<usize, IndexError> {
        let prefix = path_utils::descendant_prefix(root);
        self.with_transaction("remove", |tx| {
            tx.execute(
                "DELETE FROM files WHERE path = ?1 OR substr(path, 1, length(?2)) = ?2",
                params![root, prefix],
            )
        })
    }

    /// Delete every row of both tables; returns the number of files removed.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`]; nothing is deleted.
    pub fn clear(&self) -> Result<usize, IndexError> {
        self.with_transaction("clear", |tx| {
            tx.execute("DELETE FROM duplicates", [])?;
            tx.execute("DELETE FROM files", [])
        })
    }

    /// Rewrite a row's identity, path and extension together.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`]; nothing is changed.
    pub fn rename_record(
        &self,
        old_identity: &str,
        record: &FileRecord,
    ) -> Result<usize, IndexError> {
        self.with_transaction("move", |tx| {
            tx.execute(
                "UPDATE files SET identity = ?1, path = ?2, extension = ?3 WHERE identity = ?4",
                params![record.identity, record.path, record.extension, old_identity],
            )
        })
    }

    /// Mark identities as members of a confirmed duplicate set.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`]; nothing is written.
    pub fn record_duplicates(
        &self,
        identities: &[String],
        scanned: i64,
    ) -> Result<usize, IndexError> {
        self.with_transaction("record duplicates", |tx| {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO duplicates (identity, scanned) VALUES (?1, ?2) \
                 ON CONFLICT(identity) DO UPDATE SET scanned = excluded.scanned",
            )?;
            let mut count = 0;
            for identity in identities {
                count += stmt.execute(params![identity, scanned])?;
            }
            Ok(count)
        })
    }

    /// Drop membership rows whose identity is not in `keep`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`]; nothing is deleted.
    pub fn retain_duplicates(&self, keep: &HashSet<String>) -> Result<usize, IndexError> {
        self.with_transaction("prune duplicates", |tx| {
            let stale: Vec<String> = {
                let mut stmt = tx.prepare("SELECT identity FROM duplicates")?;
                let ids = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                ids.into_iter().filter(|id| !keep.contains(id)).collect()
            };
            let mut stmt = tx.prepare_cached("DELETE FROM duplicates WHERE identity = ?1")?;
            let mut count = 0;
            for identity in &stale {
                count += stmt.execute(params![identity])?;
            }
            Ok(count)
        })
    }

    /// Delete the file rows that have duplicate membership.
    ///
    /// Returns the identities removed.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`]; nothing is deleted.
    pub fn forget_duplicates(&self) -> Result<Vec<String>, IndexError> {
        self.with_transaction("forget duplicates", |tx| {
            let ids = {
                let mut stmt = tx.prepare("SELECT identity FROM duplicates")?;
                let ids = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                ids
            };
            tx.execute(
                "DELETE FROM files WHERE identity IN (SELECT identity FROM duplicates)",
                [],
            )?;
            Ok(ids)
        })
    }

    /// Clear every stored hash and the membership that was confirmed by them.
    ///
    /// Returns the number of rows whose hash was cleared.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`]; nothing is changed.
    pub fn forget_hashes(&self) -> Result<usize, IndexError> {
        self.with_transaction("forget hashes", |tx| {
            tx.execute("DELETE FROM duplicates", [])?;
            tx.execute("UPDATE files SET hash = NULL WHERE hash IS NOT NULL", [])
        })
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        identity: row.get(0)?,
        path: row.get(1)?,
        extension: row.get(2)?,
        size: from_sql_size(row.get(3)?),
        modified_at: row.get(4)?,
        content_hash: HashState::from_column(row.get(5)?),
        human_size: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
    })
}

fn to_sql_size(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

fn from_sql_size(size: i64) -> u64 {
    u64::try_from(size).unwrap_or(0)
}
