//! Path normalization and identity derivation.
//!
//! A tracked file keeps two strings. `path` is the canonicalized absolute
//! path exactly as the filesystem spells it, and is what every later open
//! uses. `identity` is derived from it: on macOS, whose filesystems treat
//! NFC and NFD spellings of a name as the same file, it is folded to NFC;
//! elsewhere names are raw bytes and the identity is the path unchanged.
//!
//! - NFC: `café.txt` - 'é' is U+00E9 (single code point)
//! - NFD: `café.txt` - 'e' U+0065 + combining acute accent U+0301
//!
//! Paths that are not valid Unicode cannot be stored and are rejected by
//! [`catalog_path`].
//!
//! # Example
//!
//! ```
//! use dupefiles::scanner::path_utils::normalize_path_str;
//!
//! let nfc = "café.txt";
//! let nfd = "cafe\u{0301}.txt";
//! assert_eq!(normalize_path_str(nfc), normalize_path_str(nfd));
//! ```

use std::path::{Component, Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Normalize a path string to NFC (Composed) form.
#[must_use]
pub fn normalize_path_str(s: &str) -> String {
    s.nfc().collect()
}

/// Make `path` absolute and resolve `.` and `..` without touching the filesystem.
///
/// Used for paths that may no longer exist, such as the argument to a
/// remove operation after the files were deleted.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `path` to the form stored in the catalog.
///
/// Existing paths are canonicalized (symlinked parents resolved); paths
/// that cannot be canonicalized fall back to [`normalize_lexically`].
/// The spelling of each component is left as the filesystem reports it.
#[must_use]
pub fn resolve_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| normalize_lexically(path))
}

/// Resolved `path` as a string, `None` if it is not valid Unicode.
#[must_use]
pub fn catalog_path(path: &Path) -> Option<String> {
    resolve_path(path).into_os_string().into_string().ok()
}

/// Identity for an already resolved catalog path.
#[must_use]
pub fn identity_of(path: &str) -> String {
    if cfg!(target_os = "macos") {
        normalize_path_str(path)
    } else {
        path.to_string()
    }
}

/// Derive the catalog identity for `path`.
///
/// Lossy for paths that are not valid Unicode; such paths are never
/// stored, so the result only serves lookups.
#[must_use]
pub fn identity_for(path: &Path) -> String {
    identity_of(&resolve_path(path).to_string_lossy())
}

/// Lower-cased extension without the separator, empty if there is none.
#[must_use]
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// `prefix` with a trailing separator, for descendant matching.
#[must_use]
pub fn descendant_prefix(prefix: &str) -> String {
    let sep = std::path::MAIN_SEPARATOR;
    if prefix.ends_with(sep) {
        prefix.to_string()
    } else {
        format!("{prefix}{sep}")
    }
}

/// Whether `path` equals `root` or lies beneath it.
#[must_use]
pub fn is_same_or_descendant(path: &str, root: &str) -> bool {
    path == root || path.starts_with(&descendant_prefix(root))
}
