//! Byte-level file comparison.
//!
//! Two modes are provided:
//!
//! - **Full**: both files are streamed in fixed-size chunks and compared
//!   until a mismatch or a simultaneous end of file. Exact.
//! - **Sampled**: only a random subset of byte positions is compared,
//!   either one contiguous window or scattered single-byte offsets.
//!   This is probabilistic: files that differ only outside the sampled
//!   positions are reported as identical. Files no larger than the sample
//!   fall back to full comparison.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::CompareError;

/// Chunk size for full comparison (64 KiB).
pub const COMPARE_CHUNK_SIZE: usize = 64 * 1024;

/// How sampled comparison picks positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleMode {
    /// One contiguous window of `sample_size` bytes at a random offset.
    #[default]
    Window,
    /// `sample_size` independent random byte offsets.
    Scattered,
}

/// Compare two files, fully when `sample_size == 0`, sampled otherwise.
///
/// # Errors
///
/// Returns a [`CompareError`] if either file cannot be opened or read.
pub fn compare_files(
    a: &Path,
    b: &Path,
    sample_size: u64,
    mode: SampleMode,
) -> Result<bool, CompareError> {
    if sample_size == 0 {
        compare_full(a, b)
    } else {
        compare_sampled(a, b, sample_size, mode)
    }
}

/// Byte-exact streaming comparison.
///
/// # Errors
///
/// Returns a [`CompareError`] if either file cannot be opened or read.
pub fn compare_full(a: &Path, b: &Path) -> Result<bool, CompareError> {
    let mut file_a = open(a)?;
    let mut file_b = open(b)?;
    let mut buf_a = vec![0u8; COMPARE_CHUNK_SIZE];
    let mut buf_b = vec![0u8; COMPARE_CHUNK_SIZE];

    loop {
        let n_a = fill(&mut file_a, &mut buf_a, a)?;
        let n_b = fill(&mut file_b, &mut buf_b, b)?;

        if n_a != n_b {
            return Ok(false);
        }
        if n_a == 0 {
            return Ok(true);
        }
        if buf_a[..n_a] != buf_b[..n_b] {
            return Ok(false);
        }
    }
}

/// Sampled comparison using the thread-local RNG.
///
/// # Errors
///
/// Returns a [`CompareError`] if either file cannot be opened or read.
pub fn compare_sampled(
    a: &Path,
    b: &Path,
    sample_size: u64,
    mode: SampleMode,
) -> Result<bool, CompareError> {
    compare_sampled_with_rng(a, b, sample_size, mode, &mut rand::rng())
}

/// Sampled comparison drawing positions from `rng`.
///
/// # Errors
///
/// Returns a [`CompareError`] if either file cannot be opened or read.
pub fn compare_sampled_with_rng<R: Rng + ?Sized>(
    a: &Path,
    b: &Path,
    sample_size: u64,
    mode: SampleMode,
    rng: &mut R,
) -> Result<bool, CompareError> {
    let size_a = file_len(a)?;
    let size_b = file_len(b)?;
    if size_a != size_b {
        return Ok(false);
    }
    if size_a <= sample_size {
        return compare_full(a, b);
    }

    match mode {
        SampleMode::Window => {
            let offset = rng.random_range(0..=size_a - sample_size);
            compare_window_at(a, b, offset, sample_size)
        }
        SampleMode::Scattered => match usize::try_from(size_a) {
            Ok(len) => {
                let amount = usize::try_from(sample_size).unwrap_or(len);
                let mut offsets: Vec<u64> = rand::seq::index::sample(rng, len, amount)
                    .into_iter()
                    .map(|i| i as u64)
                    .collect();
                offsets.sort_unstable();
                compare_offsets(a, b, &offsets)
            }
            Err(_) => {
                let offset = rng.random_range(0..=size_a - sample_size);
                compare_window_at(a, b, offset, sample_size)
            }
        },
    }
}

/// Compare `len` bytes of both files starting at `offset`.
///
/// Reads past the end of either file count as a mismatch.
///
/// # Errors
///
/// Returns a [`CompareError`] if either file cannot be opened, seeked or read.
pub fn compare_window_at(a: &Path, b: &Path, offset: u64, len: u64) -> Result<bool, CompareError> {
    let mut file_a = open(a)?;
    let mut file_b = open(b)?;
    seek(&mut file_a, offset, a)?;
    seek(&mut file_b, offset, b)?;

    let mut remaining = len;
    let mut buf_a = vec![0u8; COMPARE_CHUNK_SIZE];
    let mut buf_b = vec![0u8; COMPARE_CHUNK_SIZE];

    while remaining > 0 {
        let want = remaining.min(COMPARE_CHUNK_SIZE as u64) as usize;
        let n_a = fill(&mut file_a, &mut buf_a[..want], a)?;
        let n_b = fill(&mut file_b, &mut buf_b[..want], b)?;
        if n_a != want || n_b != want || buf_a[..want] != buf_b[..want] {
            return Ok(false);
        }
        remaining -= want as u64;
    }

    Ok(true)
}

/// Compare single bytes at each of `offsets` (ascending).
fn compare_offsets(a: &Path, b: &Path, offsets: &[u64]) -> Result<bool, CompareError> {
    let mut file_a = open(a)?;
    let mut file_b = open(b)?;
    let mut byte_a = [0u8; 1];
    let mut byte_b = [0u8; 1];

    for &offset in offsets {
        seek(&mut file_a, offset, a)?;
        seek(&mut file_b, offset, b)?;
        let n_a = fill(&mut file_a, &mut byte_a, a)?;
        let n_b = fill(&mut file_b, &mut byte_b, b)?;
        if n_a != 1 || n_b != 1 || byte_a != byte_b {
            return Ok(false);
        }
    }

    Ok(true)
}

fn open(path: &Path) -> Result<File, CompareError> {
    File::open(path).map_err(|source| CompareError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn file_len(path: &Path) -> Result<u64, CompareError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|source| CompareError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn seek(file: &mut File, offset: u64, path: &Path) -> Result<(), CompareError> {
    file.seek(SeekFrom::Start(offset))
        .map(|_| ())
        .map_err(|source| CompareError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Read until `buf` is full or EOF; returns the number of bytes read.
///
/// Short reads from the OS are retried so that a length difference between
/// the two sides always means a real size or EOF difference.
fn fill(file: &mut File, buf: &mut [u8], path: &Path) -> Result<usize, CompareError> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(CompareError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }
    Ok(filled)
}
