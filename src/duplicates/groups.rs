//! Size partitioning, hash buckets and scan result groups.
//!
//! # Overview
//!
//! Size grouping is the first stage of duplicate detection: files with
//! different sizes cannot be duplicates, so every size seen only once is
//! dropped without any I/O. Survivors are later routed into
//! [`HashBuckets`] keyed by `(size, content hash)`, and buckets with two or
//! more members go on to binary verification.
//!
//! # Example
//!
//! ```
//! use dupefiles::duplicates::{group_by_size, Candidate};
//! use dupefiles::index::HashState;
//! use std::path::PathBuf;
//!
//! let candidates = vec![
//!     Candidate::new("/a/1.txt", PathBuf::from("/a/1.txt"), 4, HashState::Absent),
//!     Candidate::new("/a/2.txt", PathBuf::from("/a/2.txt"), 4, HashState::Absent),
//!     Candidate::new("/a/3.txt", PathBuf::from("/a/3.txt"), 5, HashState::Absent),
//! ];
//!
//! let (groups, stats) = group_by_size(candidates);
//! assert_eq!(groups.len(), 1);
//! assert_eq!(stats.potential_duplicates, 2);
//! assert_eq!(stats.eliminated_unique, 1);
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use crate::index::{FileRecord, HashState};
use crate::scanner::ContentHash;

/// Scan-time view of one catalog record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Catalog identity
    pub identity: String,
    /// Path to read
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Hash as stored in the catalog
    pub hash: HashState,
}

impl Candidate {
    /// Build a candidate.
    #[must_use]
    pub fn new(identity: impl Into<String>, path: PathBuf, size: u64, hash: HashState) -> Self {
        Self {
            identity: identity.into(),
            path,
            size,
            hash,
        }
    }

    /// Snapshot a catalog record.
    #[must_use]
    pub fn from_record(record: &FileRecord) -> Self {
        Self {
            identity: record.identity.clone(),
            path: PathBuf::from(&record.path),
            size: record.size,
            hash: record.content_hash.clone(),
        }
    }
}

/// Candidates sharing one exact size.
#[derive(Debug, Clone)]
pub struct SizeGroup {
    /// Shared size in bytes
    pub size: u64,
    /// Members, at least two
    pub members: Vec<Candidate>,
}

/// Counts from size grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupingStats {
    /// Candidates considered
    pub total_files: usize,
    /// Distinct sizes seen
    pub unique_sizes: usize,
    /// Candidates in groups of two or more
    pub potential_duplicates: usize,
    /// Candidates dropped because their size was unique
    pub eliminated_unique: usize,
}

/// Partition candidates by size, keeping only sizes shared by two or more.
#[must_use]
pub fn group_by_size(candidates: Vec<Candidate>) -> (Vec<SizeGroup>, GroupingStats) {
    let total_files = candidates.len();
    let mut by_size: HashMap<u64, Vec<Candidate>> = HashMap::new();
    for candidate in candidates {
        by_size.entry(candidate.size).or_default().push(candidate);
    }

    let unique_sizes = by_size.len();
    let groups: Vec<SizeGroup> = by_size
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(size, members)| SizeGroup { size, members })
        .collect();

    let potential_duplicates = groups.iter().map(|g| g.members.len()).sum();
    let stats = GroupingStats {
        total_files,
        unique_sizes,
        potential_duplicates,
        eliminated_unique: total_files - potential_duplicates,
    };

    log::debug!(
        "Size grouping: {} files, {} sizes, {} potential duplicates",
        stats.total_files,
        stats.unique_sizes,
        stats.potential_duplicates
    );
    (groups, stats)
}

/// Candidates sharing a size and content hash.
#[derive(Debug, Clone)]
pub struct HashBucket {
    /// Shared size in bytes
    pub size: u64,
    /// Shared content hash
    pub hash: ContentHash,
    /// Members ordered by identity; the first is the anchor
    pub members: Vec<Candidate>,
}

/// Accumulator routing hashed candidates into buckets.
#[derive(Debug, Default)]
pub struct HashBuckets {
    buckets: HashMap<(u64, ContentHash), Vec<Candidate>>,
}

impl HashBuckets {
    /// Empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a candidate with a known hash.
    pub fn insert(&mut self, candidate: Candidate, hash: ContentHash) {
        self.buckets
            .entry((candidate.size, hash))
            .or_default()
            .push(candidate);
    }

    /// Buckets with two or more members, each sorted by identity.
    #[must_use]
    pub fn into_verifiable(self) -> Vec<HashBucket> {
        self.buckets
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|((size, hash), mut members)| {
                members.sort_by(|a, b| a.identity.cmp(&b.identity));
                HashBucket {
                    size,
                    hash,
                    members,
                }
            })
            .collect()
    }
}

/// A confirmed duplicate set returned by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultGroup {
    /// Content hash shared by every member
    pub content_hash: ContentHash,
    /// Size of each member in bytes
    pub size: u64,
    /// Member identities; the first is the anchor
    pub members: Vec<String>,
}

impl ResultGroup {
    /// Number of members beyond the anchor.
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.members.len().saturating_sub(1)
    }

    /// Bytes freed by keeping only the anchor.
    #[must_use]
    pub fn reclaimable(&self) -> u64 {
        self.size * self.duplicate_count() as u64
    }
}
