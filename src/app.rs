//! Command dispatch and plain-text output.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cli::{Cli, Commands, ScanArgs};
use crate::config::Config;
use crate::duplicates::{DuplicateScanner, ResultGroup, ScanConfig, ScanSummary};
use crate::error::ExitCode;
use crate::index::{human_size, FileIndex, FileRecord};
use crate::logging::{self, LogOptions};
use crate::progress::Progress;

/// Run the command line: load configuration, set up logging, dispatch.
///
/// # Errors
///
/// Returns any configuration, index or scan error that ended the command.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    logging::init_logging(LogOptions {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config_debug: config.debug,
    });
    log::debug!("Using index store {}", config.db_path.display());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    dispatch(cli.command, config, cli.quiet, &mut out)
}

/// Execute one command against the index described by `config`.
///
/// # Errors
///
/// Returns the error that ended the command, including failures to write
/// to `out`.
pub fn dispatch<W: Write>(
    command: Commands,
    mut config: Config,
    quiet: bool,
    out: &mut W,
) -> Result<ExitCode> {
    match command {
        Commands::Config => {
            writeln!(out, "{}", config.to_toml().context("Failed to render configuration")?)?;
            return Ok(ExitCode::Success);
        }
        Commands::Add(ref args) => {
            if let Some(min_size) = args.min_size {
                config.min_file_size = min_size;
            }
        }
        Commands::Scan(ref args) => apply_scan_overrides(&mut config, args),
        _ => {}
    }

    let mut index = FileIndex::open(config)?;

    match command {
        Commands::Add(args) => {
            let summary = index.add_path(&args.path, args.recursive, args.filter.as_deref())?;
            writeln!(
                out,
                "Added {}, updated {}, unchanged {}, filtered {}, failed {}",
                summary.added, summary.updated, summary.unchanged, summary.filtered, summary.failed
            )?;
            if summary.failed > 0 {
                return Ok(ExitCode::PartialSuccess);
            }
        }
        Commands::Remove { path } => {
            let removed = index.remove(&path)?;
            writeln!(out, "Removed {removed} file(s)")?;
        }
        Commands::Update => {
            let summary = index.update()?;
            writeln!(
                out,
                "Updated {} file(s): {} removed, {} changed, {} skipped, {} rehash failed",
                summary.affected(),
                summary.deleted,
                summary.changed,
                summary.skipped,
                summary.rehash_failed
            )?;
            if summary.has_failures() {
                return Ok(ExitCode::PartialSuccess);
            }
        }
        Commands::Purge => {
            let summary = index.purge()?;
            writeln!(out, "Purged {} file(s), skipped {}", summary.removed, summary.skipped)?;
            if summary.skipped > 0 {
                return Ok(ExitCode::PartialSuccess);
            }
        }
        Commands::Clear => {
            let removed = index.clear()?;
            writeln!(out, "Cleared {removed} file(s)")?;
        }
        Commands::Scan(args) => return scan(&mut index, args.no_progress || quiet, out),
        Commands::Files => {
            for record in index.all_records() {
                writeln!(out, "{}\t{}", record.human_size, record.path)?;
            }
        }
        Commands::Dupes { rest } => {
            let records = if rest {
                index.rest_of_duplicates()?
            } else {
                index.all_duplicates()?
            };
            print_grouped(out, &records, !rest)?;
        }
        Commands::Hashes => {
            for record in index.all_hashed_records()? {
                let hash = record.content_hash.to_column().unwrap_or_default();
                writeln!(out, "{}\t{}\t{}", hash, record.human_size, record.path)?;
            }
        }
        Commands::ForgetDupes => {
            let removed = index.forget_duplicates()?;
            writeln!(out, "Forgot {removed} duplicate file(s)")?;
        }
        Commands::ForgetHashes => {
            let cleared = index.forget_hashes()?;
            writeln!(out, "Cleared {cleared} hash(es)")?;
        }
        Commands::Move { identity, new_path } => {
            let moved = index.move_record(&identity, &new_path)?;
            writeln!(out, "Moved {} -> {}", identity, moved.path)?;
        }
        Commands::Config => {}
    }
    Ok(ExitCode::Success)
}

fn apply_scan_overrides(config: &mut Config, args: &ScanArgs) {
    if let Some(sample_size) = args.sample_size {
        config.sample_size = sample_size;
    }
    if let Some(mode) = args.sample_mode {
        config.sample_mode = mode.into();
    }
    if args.workers.is_some() {
        config.workers = args.workers;
    }
}

fn scan<W: Write>(index: &mut FileIndex, hide_progress: bool, out: &mut W) -> Result<ExitCode> {
    let mut scanner = DuplicateScanner::new(ScanConfig::from_config(index.config()));
    if !hide_progress {
        scanner = scanner.with_progress_callback(Arc::new(Progress::new(false)));
    }

    let (groups, summary) = scanner.scan_for_duplicates(index)?;
    for group in &groups {
        print_group(out, index, group)?;
    }
    print_summary(out, &summary)?;

    Ok(if summary.has_failures() {
        ExitCode::PartialSuccess
    } else if groups.is_empty() {
        ExitCode::NoDuplicates
    } else {
        ExitCode::Success
    })
}

fn print_group<W: Write>(out: &mut W, index: &FileIndex, group: &ResultGroup) -> io::Result<()> {
    writeln!(
        out,
        "{} x{} ({})",
        human_size(group.size),
        group.members.len(),
        group.content_hash
    )?;
    for identity in &group.members {
        let path = index.record(identity).map_or(identity.as_str(), |r| r.path.as_str());
        writeln!(out, "  {path}")?;
    }
    writeln!(out)
}

fn print_summary<W: Write>(out: &mut W, summary: &ScanSummary) -> io::Result<()> {
    writeln!(
        out,
        "{} group(s), {} duplicate file(s), {} reclaimable",
        summary.duplicate_groups,
        summary.duplicate_files,
        summary.reclaimable_display()
    )?;
    writeln!(
        out,
        "{} tracked, {} size candidates, {} hashes reused, {} computed",
        summary.total_records,
        summary.size_candidates,
        summary.cached_hashes,
        summary.hashes_computed
    )?;
    if summary.has_failures() {
        writeln!(
            out,
            "Skipped {} unreadable file(s) while hashing and {} while comparing",
            summary.hash_failures, summary.compare_failures
        )?;
    }
    Ok(())
}

/// Print records, separating consecutive `(size, hash)` runs with a blank line.
fn print_grouped<W: Write>(out: &mut W, records: &[FileRecord], separate: bool) -> io::Result<()> {
    let mut previous: Option<(u64, Option<String>)> = None;
    for record in records {
        let key = (record.size, record.content_hash.to_column());
        if separate && previous.as_ref().is_some_and(|p| *p != key) {
            writeln!(out)?;
        }
        writeln!(out, "{}\t{}", record.human_size, record.path)?;
        previous = Some(key);
    }
    Ok(())
}
