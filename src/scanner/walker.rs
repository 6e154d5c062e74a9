//! Directory walker used to populate the index.
//!
//! # Overview
//!
//! [`Walker`] traverses a file or directory with [`walkdir`] and reports each
//! regular file either as a [`Discovery::File`] (passes the minimum-size and
//! filename filters) or as [`Discovery::Filtered`]. Subdirectories are only
//! entered when the walk is recursive. Entries that cannot be read are
//! yielded as [`WalkError`] values rather than stopping iteration.
//!
//! # Example
//!
//! ```no_run
//! use dupefiles::scanner::{Walker, WalkOptions};
//! use dupefiles::scanner::walker::Discovery;
//! use std::path::Path;
//!
//! let options = WalkOptions::new(true, Some("*.jpg"), 1024).unwrap();
//! let walker = Walker::new(Path::new("/home/user/Pictures"), options);
//! for item in walker.walk() {
//!     match item {
//!         Ok(Discovery::File(file)) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Ok(Discovery::Filtered(_)) => {}
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

use std::fs::Metadata;
use std::path::{Path, PathBuf};

use glob::Pattern;
use walkdir::WalkDir;

use super::WalkError;

/// Options controlling which files a walk reports.
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Enter subdirectories of the root.
    pub recursive: bool,
    /// Filename glob; files whose name does not match are filtered.
    pub filter: Option<Pattern>,
    /// Files strictly smaller than this are filtered. 0 disables the check.
    pub min_size: u64,
}

impl WalkOptions {
    /// Build options, compiling the filename filter.
    ///
    /// An empty filter string means "no filter".
    ///
    /// # Errors
    ///
    /// Returns the pattern error if `filter` is not a valid glob.
    pub fn new(
        recursive: bool,
        filter: Option<&str>,
        min_size: u64,
    ) -> Result<Self, glob::PatternError> {
        let filter = match filter {
            Some(f) if !f.is_empty() => Some(Pattern::new(f)?),
            _ => None,
        };
        Ok(Self {
            recursive,
            filter,
            min_size,
        })
    }
}

/// Metadata for a file that passed the walk filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Path as reported by the walk
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Modification time, seconds since the Unix epoch
    pub modified_at: i64,
}

/// Outcome for one regular file seen during a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// The file passed every filter.
    File(DiscoveredFile),
    /// The file was excluded by the size or filename filter.
    Filtered(PathBuf),
}

/// Walker over a single file or a directory tree.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    options: WalkOptions,
}

impl Walker {
    /// Create a new walker rooted at `path`.
    #[must_use]
    pub fn new(path: &Path, options: WalkOptions) -> Self {
        Self {
            root: path.to_path_buf(),
            options,
        }
    }

    /// Walk the tree, yielding one item per regular file.
    ///
    /// When the root is itself a file, exactly that file is evaluated.
    /// Symbolic links are not followed and are not reported.
    pub fn walk(&self) -> impl Iterator<Item = Result<Discovery, WalkError>> + '_ {
        let max_depth = if self.options.recursive { usize::MAX } else { 1 };

        WalkDir::new(&self.root)
            .follow_links(false)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) => {
                    let file_type = entry.file_type();
                    if file_type.is_dir() {
                        return None;
                    }
                    if file_type.is_symlink() {
                        log::trace!("Skipping symlink: {}", entry.path().display());
                        return None;
                    }
                    match entry.metadata() {
                        Ok(metadata) if metadata.is_file() => {
                            Some(self.evaluate(entry.path(), &metadata))
                        }
                        Ok(_) => None,
                        Err(e) => Some(Err(WalkError::Walk(e))),
                    }
                }
                Err(e) => Some(Err(WalkError::Walk(e))),
            })
    }

    /// Apply the size and filename filters to one file.
    ///
    /// # Errors
    ///
    /// Returns [`WalkError::Io`] if the modification time is unavailable.
    pub fn evaluate(&self, path: &Path, metadata: &Metadata) -> Result<Discovery, WalkError> {
        if !self.passes_filter(path) {
            log::trace!("Skipping file due to filter: {}", path.display());
            return Ok(Discovery::Filtered(path.to_path_buf()));
        }

        let size = metadata.len();
        if !self.passes_size_filter(size) {
            log::trace!(
                "Skipping file due to size filter ({}): {}",
                size,
                path.display()
            );
            return Ok(Discovery::Filtered(path.to_path_buf()));
        }

        let modified_at = modified_seconds(metadata).map_err(|source| WalkError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Discovery::File(DiscoveredFile {
            path: path.to_path_buf(),
            size,
            modified_at,
        }))
    }

    fn passes_filter(&self, path: &Path) -> bool {
        match &self.options.filter {
            Some(pattern) => path
                .file_name()
                .is_some_and(|name| pattern.matches(&name.to_string_lossy())),
            None => true,
        }
    }

    fn passes_size_filter(&self, size: u64) -> bool {
        self.options.min_size == 0 || size >= self.options.min_size
    }
}

/// Modification time of `metadata` in whole seconds since the Unix epoch.
///
/// # Errors
///
/// Returns the I/O error if the platform does not report modification times.
pub fn modified_seconds(metadata: &Metadata) -> std::io::Result<i64> {
    let modified = metadata.modified()?;
    Ok(chrono::DateTime::<chrono::Utc>::from(modified).timestamp())
}
