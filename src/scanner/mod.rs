//! Filesystem primitives used by the index and the duplicate scanner.
//!
//! This module provides functionality for:
//! - Directory walking with depth control and filename filters
//! - Content hashing with a size-dependent digest policy
//! - Byte-exact and sampled binary comparison
//! - Identity derivation from canonicalized, NFC-normalized paths
//!
//! # Architecture
//!
//! - [`walker`]: Directory traversal and file discovery
//! - [`hasher`]: Streaming content hashes (BLAKE3 / SHA-256 / SHA-512)
//! - [`compare`]: Full and sampled file comparison
//! - [`path_utils`]: Identity and path normalization helpers
//!
//! Nothing in here touches the durable store. Persistence is the caller's job.
//!
//! # Example
//!
//! ```no_run
//! use dupefiles::scanner::{compare_full, compute_content_hash, HashPolicy};
//! use std::path::Path;
//!
//! let policy = HashPolicy::default();
//! let hash = compute_content_hash(Path::new("a.bin"), 4, &policy).unwrap();
//! println!("{hash}");
//!
//! let same = compare_full(Path::new("a.bin"), Path::new("b.bin")).unwrap();
//! println!("identical: {same}");
//! ```

pub mod compare;
pub mod hasher;
pub mod path_utils;
pub mod walker;

use std::path::PathBuf;

pub use compare::{compare_files, compare_full, compare_sampled, compare_window_at, SampleMode};
pub use hasher::{compute_content_hash, ContentHash, HashAlgorithm, HashPolicy};
pub use walker::{DiscoveredFile, WalkOptions, Walker};

/// Errors that can occur while hashing a single file.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    pub(crate) fn from_io(path: &std::path::Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Errors that can occur while comparing two files.
#[derive(thiserror::Error, Debug)]
pub enum CompareError {
    /// An I/O error occurred while reading one of the files.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Errors reported for individual entries during a directory walk.
#[derive(thiserror::Error, Debug)]
pub enum WalkError {
    /// Metadata for the entry could not be read.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The traversal itself failed for an entry (permissions, loops).
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// The path cannot be stored because it is not valid Unicode.
    #[error("Path is not valid Unicode: {}", .0.display())]
    NonUnicodePath(PathBuf),
}
