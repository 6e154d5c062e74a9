//! Persistent file index.
//!
//! [`FileIndex`] owns the catalog: an in-memory map of identity to
//! [`FileRecord`] mirrored from a durable SQLite [`Store`]. Every mutation
//! commits to the store first and only then touches the map, so a failed
//! transaction leaves both sides at their pre-operation state.
//!
//! # Example
//!
//! ```no_run
//! use dupefiles::config::Config;
//! use dupefiles::index::FileIndex;
//! use std::path::Path;
//!
//! let mut index = FileIndex::open(Config::default()).unwrap();
//! let summary = index.add_path(Path::new("/home/user/Music"), true, Some("*.flac")).unwrap();
//! println!("{} added, {} unchanged", summary.added, summary.unchanged);
//! ```

pub mod database;
pub mod record;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub use database::Store;
pub use record::{human_size, FileRecord, HashState};

use crate::config::Config;
use crate::scanner::walker::{self, Discovery};
use crate::scanner::{compute_content_hash, path_utils, ContentHash, WalkOptions, Walker};

/// Errors from index operations.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// The durable store could not be opened or initialized.
    #[error("Index store unavailable at {path}: {source}")]
    StoreUnavailable {
        /// Store location
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A batched mutation failed and was rolled back.
    #[error("Transaction failed during {operation}: {source}")]
    TransactionFailure {
        /// Operation that was running
        operation: &'static str,
        /// Underlying SQLite error
        #[source]
        source: rusqlite::Error,
    },

    /// A read query failed.
    #[error("Index query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// A thread panicked while holding the store connection.
    #[error("Index store lock poisoned")]
    StorePoisoned,

    /// The path argument is empty or neither a file nor a directory.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The filename filter is not a valid glob.
    #[error("Invalid filter '{pattern}': {source}")]
    InvalidFilter {
        /// Pattern as given
        pattern: String,
        /// Glob compile error
        #[source]
        source: glob::PatternError,
    },

    /// No record has the given identity.
    #[error("No tracked file with identity {0}")]
    UnknownRecord(String),

    /// Another record already has the target identity.
    #[error("A tracked file already has identity {0}")]
    IdentityConflict(String),
}

/// Counts reported by [`FileIndex::add_path`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddSummary {
    /// New records
    pub added: usize,
    /// Known records whose size or mtime changed
    pub updated: usize,
    /// Known records with identical stat data
    pub unchanged: usize,
    /// Files excluded by the size or filename filter
    pub filtered: usize,
    /// Entries that could not be read
    pub failed: usize,
}

/// Counts reported by [`FileIndex::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Records dropped because their file is gone
    pub deleted: usize,
    /// Records whose size or mtime changed
    pub changed: usize,
    /// Records left untouched because their file could not be stat'ed
    pub skipped: usize,
    /// Changed records whose rehash failed; stored without a hash
    pub rehash_failed: usize,
}

impl UpdateSummary {
    /// Records deleted or changed.
    #[must_use]
    pub fn affected(&self) -> usize {
        self.deleted + self.changed
    }

    /// Whether any record could not be fully refreshed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.skipped > 0 || self.rehash_failed > 0
    }
}

/// Counts reported by [`FileIndex::purge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    /// Records dropped because their file is gone
    pub removed: usize,
    /// Records kept because their file could not be stat'ed
    pub skipped: usize,
}

/// What a re-stat found at a tracked path.
enum TrackedStatus {
    /// A regular file is still there.
    Present(fs::Metadata),
    /// Nothing is there, or something that is not a regular file.
    Missing,
    /// The path could not be checked.
    Unknown(io::Error),
}

/// Re-stat a tracked path without following a final symlink.
fn tracked_status(path: &str) -> TrackedStatus {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_file() => TrackedStatus::Present(metadata),
        Ok(_) => TrackedStatus::Missing,
        Err(e) if e.kind() == io::ErrorKind::NotFound => TrackedStatus::Missing,
        Err(e) => TrackedStatus::Unknown(e),
    }
}

/// Resolved form of a path argument, rejecting paths that cannot be stored.
fn catalog_argument(path: &Path) -> Result<String, IndexError> {
    if path.as_os_str().is_empty() {
        return Err(IndexError::InvalidPath("empty path".to_string()));
    }
    path_utils::catalog_path(path).ok_or_else(|| {
        IndexError::InvalidPath(format!("{} is not valid Unicode", path.display()))
    })
}

/// The catalog of tracked files.
#[derive(Debug)]
pub struct FileIndex {
    store: Store,
    records: HashMap<String, FileRecord>,
    config: Config,
}

impl FileIndex {
    /// Open the store at `config.db_path` and load every record.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::StoreUnavailable`] if the store cannot be opened.
    pub fn open(config: Config) -> Result<Self, IndexError> {
        let store = Store::open(&config.db_path)?;
        Self::with_store(store, config)
    }

    /// Open an empty index backed by a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::StoreUnavailable`] if SQLite cannot initialize.
    pub fn open_in_memory(config: Config) -> Result<Self, IndexError> {
        Self::with_store(Store::open_in_memory()?, config)
    }

    fn with_store(store: Store, config: Config) -> Result<Self, IndexError> {
        let records: HashMap<String, FileRecord> = store
            .load_all()?
            .into_iter()
            .map(|r| (r.identity.clone(), r))
            .collect();
        log::debug!("Loaded {} records from the index", records.len());
        Ok(Self {
            store,
            records,
            config,
        })
    }

    /// Configuration the index was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Location of the store file, `None` for in-memory indexes.
    #[must_use]
    pub fn store_path(&self) -> Option<&Path> {
        self.store.path()
    }

    /// Every record, ordered by identity.
    #[must_use]
    pub fn all_records(&self) -> Vec<&FileRecord> {
        let mut records: Vec<&FileRecord> = self.records.values().collect();
        records.sort_by(|a, b| a.identity.cmp(&b.identity));
        records
    }

    /// Record with the given identity.
    #[must_use]
    pub fn record(&self, identity: &str) -> Option<&FileRecord> {
        self.records.get(identity)
    }

    /// Number of tracked files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no files are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records with duplicate membership, size descending then hash.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] on store failure.
    pub fn all_duplicates(&self) -> Result<Vec<FileRecord>, IndexError> {
        self.store.duplicates()
    }

    /// Duplicate members except the first (lowest identity) of each set.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] on store failure.
    pub fn rest_of_duplicates(&self) -> Result<Vec<FileRecord>, IndexError> {
        self.store.rest_of_duplicates()
    }

    /// Records with a stored hash, size descending then hash.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] on store failure.
    pub fn all_hashed_records(&self) -> Result<Vec<FileRecord>, IndexError> {
        self.store.hashed()
    }

    /// Identities with duplicate membership.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] on store failure.
    pub fn duplicate_identities(&self) -> Result<Vec<String>, IndexError> {
        self.store.duplicate_identities()
    }

    /// Track a file, or the files of a directory.
    ///
    /// Directory contents are written in one transaction. Entries that
    /// cannot be read are logged and counted as failed. Records whose size
    /// and mtime are unchanged are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidPath`] or [`IndexError::InvalidFilter`]
    /// before any change, or [`IndexError::TransactionFailure`] if the batch
    /// could not be committed.
    pub fn add_path(
        &mut self,
        path: &Path,
        recursive: bool,
        filter: Option<&str>,
    ) -> Result<AddSummary, IndexError> {
        if path.as_os_str().is_empty() {
            return Err(IndexError::InvalidPath("empty path".to_string()));
        }
        let metadata = fs::metadata(path)
            .map_err(|e| IndexError::InvalidPath(format!("{}: {}", path.display(), e)))?;
        if !metadata.is_file() && !metadata.is_dir() {
            return Err(IndexError::InvalidPath(format!(
                "{} is neither a file nor a directory",
                path.display()
            )));
        }

        let options = WalkOptions::new(recursive, filter, self.config.min_file_size).map_err(
            |source| IndexError::InvalidFilter {
                pattern: filter.unwrap_or_default().to_string(),
                source,
            },
        )?;

        let mut summary = AddSummary::default();
        let mut pending = Vec::new();
        let mut seen = HashSet::new();

        for item in Walker::new(path, options).walk() {
            let record = match item {
                Ok(Discovery::File(file)) => FileRecord::from_discovered(&file),
                Ok(Discovery::Filtered(_)) => {
                    summary.filtered += 1;
                    continue;
                }
                Err(e) => Err(e),
            };
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    log::warn!("Skipping unreadable entry: {}", e);
                    summary.failed += 1;
                    continue;
                }
            };
            if !seen.insert(record.identity.clone()) {
                continue;
            }

            match self.records.get(&record.identity) {
                Some(existing) if existing.is_unchanged(record.size, record.modified_at) => {
                    log::trace!("Unchanged: {}", record.path);
                    summary.unchanged += 1;
                }
                Some(_) => {
                    log::debug!("Changed since last add: {}", record.path);
                    summary.updated += 1;
                    pending.push(record);
                }
                None => {
                    summary.added += 1;
                    pending.push(record);
                }
            }
        }

        self.store.upsert_records(&pending)?;
        for record in pending {
            self.records.insert(record.identity.clone(), record);
        }

        log::info!(
            "Added {}: {} new, {} updated, {} unchanged, {} filtered, {} failed",
            path.display(),
            summary.added,
            summary.updated,
            summary.unchanged,
            summary.filtered,
            summary.failed
        );
        Ok(summary)
    }

    /// Re-stat every record, dropping missing files and rehashing changed ones.
    ///
    /// Records whose file cannot be stat'ed are left as they are and counted
    /// as skipped. A changed record whose rehash fails is stored without a
    /// hash.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`] if either batch fails.
    pub fn update(&mut self) -> Result<UpdateSummary, IndexError> {
        let mut summary = UpdateSummary::default();
        let mut deleted = Vec::new();
        let mut changed = Vec::new();

        for record in self.all_records() {
            let metadata = match tracked_status(&record.path) {
                TrackedStatus::Present(metadata) => metadata,
                TrackedStatus::Missing => {
                    deleted.push(record.identity.clone());
                    continue;
                }
                TrackedStatus::Unknown(e) => {
                    log::warn!("Cannot stat {}: {}", record.path, e);
                    summary.skipped += 1;
                    continue;
                }
            };
            let modified_at = match walker::modified_seconds(&metadata) {
                Ok(t) => t,
                Err(e) => {
                    log::warn!("Cannot read mtime of {}: {}", record.path, e);
                    summary.skipped += 1;
                    continue;
                }
            };
            if record.is_unchanged(metadata.len(), modified_at) {
                continue;
            }

            let mut refreshed = record.clone();
            refreshed.refresh_stat(metadata.len(), modified_at);
            let policy = &self.config.hash_policy;
            match compute_content_hash(Path::new(&refreshed.path), refreshed.size, policy) {
                Ok(hash) => refreshed.content_hash = HashState::Present(hash),
                Err(e) => {
                    log::warn!("Failed to rehash {}: {}", refreshed.path, e);
                    summary.rehash_failed += 1;
                }
            }
            changed.push(refreshed);
        }

        self.store.delete_identities("update", &deleted)?;
        summary.deleted = deleted.len();
        for identity in &deleted {
            self.records.remove(identity);
        }

        self.store.update_records(&changed)?;
        summary.changed = changed.len();
        for record in changed {
            self.records.insert(record.identity.clone(), record);
        }

        log::info!(
            "Update: {} removed, {} changed, {} skipped",
            summary.deleted,
            summary.changed,
            summary.skipped
        );
        Ok(summary)
    }

    /// Drop every record whose file no longer exists.
    ///
    /// A path that now holds something other than a regular file counts as
    /// gone. Paths that cannot be checked are kept and counted as skipped.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`] if the batch fails.
    pub fn purge(&mut self) -> Result<PurgeSummary, IndexError> {
        let mut summary = PurgeSummary::default();
        let mut missing = Vec::new();
        for record in self.records.values() {
            match tracked_status(&record.path) {
                TrackedStatus::Present(_) => {}
                TrackedStatus::Missing => missing.push(record.identity.clone()),
                TrackedStatus::Unknown(e) => {
                    log::warn!("Cannot stat {}: {}", record.path, e);
                    summary.skipped += 1;
                }
            }
        }

        summary.removed = self.store.delete_identities("purge", &missing)?;
        for identity in &missing {
            self.records.remove(identity);
        }
        log::info!("Purged {} missing file(s)", summary.removed);
        Ok(summary)
    }

    /// Drop every record at or beneath `path`. Returns the count removed.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidPath`] for an empty or non-Unicode path,
    /// or [`IndexError::TransactionFailure`] if the delete fails.
    pub fn remove(&mut self, path: &Path) -> Result<usize, IndexError> {
        let root = catalog_argument(path)?;

        let removed = self.store.delete_path_tree(&root)?;
        self.records
            .retain(|_, r| !path_utils::is_same_or_descendant(&r.path, &root));
        log::info!("Removed {} record(s) under {}", removed, root);
        Ok(removed)
    }

    /// Drop every record and membership. Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`] if the delete fails.
    pub fn clear(&mut self) -> Result<usize, IndexError> {
        let removed = self.store.clear()?;
        self.records.clear();
        Ok(removed)
    }

    /// Point a record at a new location without touching the filesystem.
    ///
    /// Identity, path and extension change together; duplicate membership
    /// follows the new identity.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidPath`], [`IndexError::UnknownRecord`] or
    /// [`IndexError::IdentityConflict`] before any change, or
    /// [`IndexError::TransactionFailure`].
    pub fn move_record(
        &mut self,
        identity: &str,
        new_path: &Path,
    ) -> Result<FileRecord, IndexError> {
        let path = catalog_argument(new_path)?;
        let existing = self
            .records
            .get(identity)
            .ok_or_else(|| IndexError::UnknownRecord(identity.to_string()))?;

        let new_identity = path_utils::identity_of(&path);
        if new_identity != identity && self.records.contains_key(&new_identity) {
            return Err(IndexError::IdentityConflict(new_identity));
        }

        let mut moved = existing.clone();
        moved.extension = path_utils::extension_of(Path::new(&path));
        moved.path = path;
        moved.identity = new_identity;

        if self.store.rename_record(identity, &moved)? == 0 {
            return Err(IndexError::UnknownRecord(identity.to_string()));
        }
        self.records.remove(identity);
        self.records.insert(moved.identity.clone(), moved.clone());
        log::info!("Moved {} -> {}", identity, moved.path);
        Ok(moved)
    }

    /// Delete the records that have duplicate membership. Returns the count removed.
    ///
    /// Files on disk are not touched.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`] if the delete fails.
    pub fn forget_duplicates(&mut self) -> Result<usize, IndexError> {
        let forgotten = self.store.forget_duplicates()?;
        for identity in &forgotten {
            self.records.remove(identity);
        }
        Ok(forgotten.len())
    }

    /// Clear every stored hash. Returns the number of records that had one.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`] if the update fails.
    pub fn forget_hashes(&mut self) -> Result<usize, IndexError> {
        let cleared = self.store.forget_hashes()?;
        for record in self.records.values_mut() {
            record.content_hash = HashState::Absent;
        }
        Ok(cleared)
    }

    /// Store hashes computed during a scan in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`]; no hash is applied.
    pub fn apply_hashes(
        &mut self,
        hashes: &[(String, ContentHash)],
    ) -> Result<usize, IndexError> {
        let written = self.store.update_hashes(hashes)?;
        for (identity, hash) in hashes {
            if let Some(record) = self.records.get_mut(identity) {
                record.content_hash = HashState::Present(hash.clone());
            }
        }
        Ok(written)
    }

    /// Persist membership for one confirmed duplicate set.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`]; no membership is written.
    pub fn record_duplicate_set(
        &self,
        identities: &[String],
        scanned_at: i64,
    ) -> Result<usize, IndexError> {
        self.store.record_duplicates(identities, scanned_at)
    }

    /// Drop membership of identities not in `confirmed`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionFailure`]; nothing is dropped.
    pub fn retain_duplicates(&self, confirmed: &HashSet<String>) -> Result<usize, IndexError> {
        self.store.retain_duplicates(confirmed)
    }
}
