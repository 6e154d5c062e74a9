//! Command-line interface definitions.
//!
//! # Example
//!
//! ```bash
//! # Track a directory tree, only JPEGs
//! dupefiles add -r ~/Pictures --filter '*.jpg'
//!
//! # Find duplicates among everything tracked
//! dupefiles scan
//!
//! # List every duplicate except one per group
//! dupefiles dupes --rest
//! ```

use bytesize::ByteSize;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::scanner::SampleMode;

/// Indexed duplicate file finder.
///
/// Tracked files are kept in a persistent catalog so that unchanged files
/// are never re-read between scans.
#[derive(Debug, Parser)]
#[command(name = "dupefiles")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Index store location, overriding the configuration
    #[arg(long, value_name = "FILE", global = true)]
    pub db: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Track a file or the files of a directory
    Add(AddArgs),
    /// Stop tracking a path and everything beneath it
    Remove {
        /// File or directory to forget
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Re-stat tracked files, dropping missing ones and rehashing changed ones
    Update,
    /// Drop tracked files that no longer exist
    Purge,
    /// Drop every tracked file
    Clear,
    /// Find duplicates among the tracked files
    Scan(ScanArgs),
    /// List tracked files
    Files,
    /// List files found to be duplicates by the last scan
    Dupes {
        /// Omit the first file of each group
        #[arg(long)]
        rest: bool,
    },
    /// List tracked files with a stored hash
    Hashes,
    /// Drop the tracked files that are duplicates (files on disk are kept)
    ForgetDupes,
    /// Clear every stored hash
    ForgetHashes,
    /// Point a tracked file at a new location
    Move {
        /// Identity of the tracked file
        #[arg(value_name = "IDENTITY")]
        identity: String,
        /// New location
        #[arg(value_name = "NEW_PATH")]
        new_path: PathBuf,
    },
    /// Print the resolved configuration
    Config,
}

/// Arguments for the add subcommand.
#[derive(Debug, Args)]
pub struct AddArgs {
    /// File or directory to track
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Only track files whose name matches this glob
    #[arg(short, long, value_name = "GLOB")]
    pub filter: Option<String>,

    /// Minimum file size to track (e.g. 4KiB, 1MB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args, Default)]
pub struct ScanArgs {
    /// Bytes to sample per comparison; 0 compares whole files
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub sample_size: Option<u64>,

    /// How sampled comparison picks positions
    #[arg(long, value_enum, value_name = "MODE")]
    pub sample_mode: Option<SampleModeArg>,

    /// Worker thread cap
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Do not draw progress bars
    #[arg(long)]
    pub no_progress: bool,
}

/// Sampling mode as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SampleModeArg {
    /// One random contiguous window
    Window,
    /// Independent random byte offsets
    Scattered,
}

impl From<SampleModeArg> for SampleMode {
    fn from(arg: SampleModeArg) -> Self {
        match arg {
            SampleModeArg::Window => Self::Window,
            SampleModeArg::Scattered => Self::Scattered,
        }
    }
}

/// Parse a size with an optional unit suffix (B, KB, KiB, MB, MiB, ...).
///
/// # Errors
///
/// Returns a message if the value is empty or not a size.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }
    s.parse::<ByteSize>()
        .map(|size| size.as_u64())
        .map_err(|e| format!("Invalid size '{s}': {e}"))
}
