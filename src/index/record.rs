//! Catalog record definitions.

use bytesize::ByteSize;

use crate::scanner::walker::DiscoveredFile;
use crate::scanner::{path_utils, ContentHash, HashPolicy, WalkError};

/// Whether a record carries a computed content hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HashState {
    /// Not hashed yet, or invalidated by a size/mtime change.
    #[default]
    Absent,
    /// Hash computed for the record's current size and mtime.
    Present(ContentHash),
}

impl HashState {
    /// Parse the nullable `hash` column.
    ///
    /// Values that do not parse are treated as absent so they get recomputed.
    #[must_use]
    pub fn from_column(value: Option<String>) -> Self {
        match value {
            Some(text) => match text.parse::<ContentHash>() {
                Ok(hash) => Self::Present(hash),
                Err(e) => {
                    log::debug!("Discarding stored hash '{}': {}", text, e);
                    Self::Absent
                }
            },
            None => Self::Absent,
        }
    }

    /// Value for the nullable `hash` column.
    #[must_use]
    pub fn to_column(&self) -> Option<String> {
        match self {
            Self::Absent => None,
            Self::Present(hash) => Some(hash.to_string()),
        }
    }

    /// The hash, if present.
    #[must_use]
    pub fn as_hash(&self) -> Option<&ContentHash> {
        match self {
            Self::Absent => None,
            Self::Present(hash) => Some(hash),
        }
    }

    /// Whether a scan must (re)compute the hash for a file of `size` bytes.
    #[must_use]
    pub fn needs_hashing(&self, policy: &HashPolicy, size: u64) -> bool {
        match self {
            Self::Absent => true,
            Self::Present(hash) => !policy.accepts(hash, size),
        }
    }
}

/// One tracked filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Canonicalized path; unique key and duplicate-membership join key
    pub identity: String,
    /// Current absolute path
    pub path: String,
    /// Lower-cased suffix without separator, may be empty
    pub extension: String,
    /// Size in bytes
    pub size: u64,
    /// Modification time, seconds since the Unix epoch
    pub modified_at: i64,
    /// Content hash state
    pub content_hash: HashState,
    /// Cached display string for `size`
    pub human_size: String,
}

impl FileRecord {
    /// Build an unhashed record from a walk result.
    ///
    /// # Errors
    ///
    /// Returns [`WalkError::NonUnicodePath`] if the resolved path cannot be
    /// stored.
    pub fn from_discovered(file: &DiscoveredFile) -> Result<Self, WalkError> {
        let resolved = path_utils::resolve_path(&file.path);
        let Some(path) = resolved.to_str().map(str::to_string) else {
            return Err(WalkError::NonUnicodePath(resolved));
        };
        Ok(Self {
            identity: path_utils::identity_of(&path),
            extension: path_utils::extension_of(&resolved),
            path,
            size: file.size,
            modified_at: file.modified_at,
            content_hash: HashState::Absent,
            human_size: human_size(file.size),
        })
    }

    /// Whether the record's stat data matches `size` and `modified_at`.
    #[must_use]
    pub fn is_unchanged(&self, size: u64, modified_at: i64) -> bool {
        self.size == size && self.modified_at == modified_at
    }

    /// Refresh size and mtime, invalidating the hash.
    pub fn refresh_stat(&mut self, size: u64, modified_at: i64) {
        self.size = size;
        self.modified_at = modified_at;
        self.human_size = human_size(size);
        self.content_hash = HashState::Absent;
    }
}

/// Human-readable form of a byte count.
#[must_use]
pub fn human_size(size: u64) -> String {
    ByteSize::b(size).to_string()
}
