//! Streaming content hashes with a size-dependent digest policy.
//!
//! # Overview
//!
//! Files are hashed by streaming their bytes through a digest in fixed-size
//! chunks, so memory use does not depend on file size. The digest is chosen
//! per file by a [`HashPolicy`]: a fast digest below a size threshold and a
//! stronger one at or above it. Large files are rare, and their hashing time
//! is dominated by I/O anyway.
//!
//! Hashes are stored tagged with their algorithm (`"blake3:<hex>"`), so a
//! cached value produced under a different policy is never compared against
//! a freshly computed one.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use super::HashError;

/// Buffer size for streaming reads (64 KiB).
pub const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Default size at which the policy switches to the large-file digest (2 GiB).
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 2 * 1024 * 1024 * 1024;

/// Supported content digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// BLAKE3, 256-bit output.
    Blake3,
    /// SHA-256.
    Sha256,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Tag used in the stored representation.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Blake3 => "blake3",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of the hex digest produced by this algorithm.
    #[must_use]
    pub fn hex_len(self) -> usize {
        match self {
            Self::Blake3 | Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for HashAlgorithm {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blake3" => Ok(Self::Blake3),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(ParseHashError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Selects the digest for a file from its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashPolicy {
    /// Digest for files smaller than `threshold`.
    pub small: HashAlgorithm,
    /// Digest for files of `threshold` bytes or more.
    pub large: HashAlgorithm,
    /// Switch-over size in bytes.
    pub threshold: u64,
}

impl Default for HashPolicy {
    fn default() -> Self {
        Self {
            small: HashAlgorithm::Blake3,
            large: HashAlgorithm::Sha512,
            threshold: DEFAULT_LARGE_FILE_THRESHOLD,
        }
    }
}

impl HashPolicy {
    /// Digest to use for a file of `size` bytes.
    #[must_use]
    pub fn algorithm_for(&self, size: u64) -> HashAlgorithm {
        if size >= self.threshold {
            self.large
        } else {
            self.small
        }
    }

    /// Whether a stored hash is still usable for a file of `size` bytes.
    #[must_use]
    pub fn accepts(&self, hash: &ContentHash, size: u64) -> bool {
        hash.algorithm == self.algorithm_for(size)
    }
}

/// Errors parsing a stored content hash.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseHashError {
    /// No `algorithm:` prefix was present.
    #[error("Missing algorithm tag in '{0}'")]
    MissingTag(String),

    /// The algorithm tag is not one we produce.
    #[error("Unknown hash algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// The digest is not lowercase hex of the expected length.
    #[error("Malformed {algorithm} digest")]
    MalformedDigest {
        /// Algorithm named by the tag
        algorithm: HashAlgorithm,
    },
}

/// A computed content digest, tagged with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash {
    algorithm: HashAlgorithm,
    digest: String,
}

impl ContentHash {
    /// Build a hash from an algorithm and lowercase hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`ParseHashError::MalformedDigest`] if the digest is not
    /// lowercase hex of the algorithm's length.
    pub fn new(
        algorithm: HashAlgorithm,
        digest: impl Into<String>,
    ) -> Result<Self, ParseHashError> {
        let digest = digest.into();
        let well_formed = digest.len() == algorithm.hex_len()
            && digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(ParseHashError::MalformedDigest { algorithm });
        }
        Ok(Self { algorithm, digest })
    }

    /// Algorithm that produced this digest.
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Lowercase hex digest without the tag.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.tag(), self.digest)
    }
}

impl FromStr for ContentHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, digest) = s
            .split_once(':')
            .ok_or_else(|| ParseHashError::MissingTag(s.to_string()))?;
        let algorithm = tag.parse::<HashAlgorithm>()?;
        Self::new(algorithm, digest)
    }
}

/// Compute the content hash of a file, picking the digest from `policy`.
///
/// `size` is the size recorded in the catalog; it selects the algorithm and
/// is not re-checked against the file.
///
/// # Errors
///
/// Returns a [`HashError`] if the file cannot be opened or read.
pub fn compute_content_hash(
    path: &Path,
    size: u64,
    policy: &HashPolicy,
) -> Result<ContentHash, HashError> {
    let algorithm = policy.algorithm_for(size);
    let digest = match algorithm {
        HashAlgorithm::Blake3 => {
            let mut hasher = blake3::Hasher::new();
            stream_file(path, |chunk| {
                hasher.update(chunk);
            })?;
            hasher.finalize().to_hex().to_string()
        }
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            stream_file(path, |chunk| hasher.update(chunk))?;
            format!("{:x}", hasher.finalize())
        }
        HashAlgorithm::Sha512 => {
            let mut hasher = Sha512::new();
            stream_file(path, |chunk| hasher.update(chunk))?;
            format!("{:x}", hasher.finalize())
        }
    };

    log::trace!("Hashed {} with {}", path.display(), algorithm);
    Ok(ContentHash { algorithm, digest })
}

/// Feed every byte of the file at `path` to `sink`, chunk by chunk.
fn stream_file(path: &Path, mut sink: impl FnMut(&[u8])) -> Result<u64, HashError> {
    let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(HashError::from_io(path, e)),
        };
        sink(&buffer[..n]);
        total += n as u64;
    }

    Ok(total)
}
