//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Size-based candidate grouping (stage 1)
//! - Content hashing with stored-hash reuse (stage 2)
//! - Binary verification of hash buckets (stage 3)
//! - Recording confirmed groups as duplicate membership

pub mod budget;
pub mod finder;
pub mod groups;

pub use finder::{DuplicateScanner, FinderError, ScanConfig, ScanSummary};
pub use groups::{
    group_by_size, Candidate, GroupingStats, HashBucket, HashBuckets, ResultGroup, SizeGroup,
};
