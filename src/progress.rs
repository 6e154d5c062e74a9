//! Progress reporting utilities using indicatif.
//!
//! The scanner reports through [`ProgressCallback`]; [`Progress`] renders
//! those events as terminal progress bars for the `scan` command.

use std::sync::{Mutex, MutexGuard, PoisonError};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Phase name for content hashing.
pub const PHASE_HASH: &str = "hash";
/// Phase name for binary verification of hash buckets.
pub const PHASE_VERIFY: &str = "verify";

/// Progress callback for duplicate scan phases.
///
/// Implement this trait to receive progress updates during
/// the duplicate detection pipeline.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase ([`PHASE_HASH`] or [`PHASE_VERIFY`])
    /// * `total` - Total number of items to process
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for each item processed.
    ///
    /// # Arguments
    ///
    /// * `current` - Items processed so far in this phase (1-based)
    /// * `path` - Path just processed
    fn on_progress(&self, current: usize, path: &str);

    /// Called when an item has been processed, providing its size.
    fn on_item_completed(&self, _bytes: u64) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);
}

/// Terminal progress reporter.
pub struct Progress {
    multi: MultiProgress,
    hash: Mutex<Option<ProgressBar>>,
    verify: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Examples
    ///
    /// ```
    /// use dupefiles::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            hash: Mutex::new(None),
            verify: Mutex::new(None),
            quiet,
        }
    }

    fn slot(&self, phase: &str) -> Option<MutexGuard<'_, Option<ProgressBar>>> {
        let slot = match phase {
            PHASE_HASH => &self.hash,
            PHASE_VERIFY => &self.verify,
            _ => return None,
        };
        Some(slot.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn active(&self) -> Option<ProgressBar> {
        [PHASE_VERIFY, PHASE_HASH]
            .into_iter()
            .find_map(|phase| self.slot(phase).and_then(|bar| bar.clone()))
    }

    fn style(phase: &str) -> ProgressStyle {
        let template = if phase == PHASE_HASH {
            concat!(
                "[{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} ({percent}%) ",
                "{msg} {per_sec} (ETA: {eta})"
            )
        } else {
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})"
        };
        ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }
        let pb = self.multi.add(ProgressBar::new(total as u64));
        pb.set_style(Self::style(phase));
        pb.set_message(match phase {
            PHASE_HASH => "Hashing".to_string(),
            PHASE_VERIFY => "Verifying".to_string(),
            other => other.to_string(),
        });
        if let Some(mut slot) = self.slot(phase) {
            *slot = Some(pb);
        }
    }

    fn on_progress(&self, current: usize, path: &str) {
        if self.quiet {
            return;
        }
        if let Some(pb) = self.active() {
            pb.set_position(current as u64);
            pb.set_message(truncate_path(path, 30));
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        if let Some(pb) = self.slot(phase).and_then(|mut slot| slot.take()) {
            let message = match phase {
                PHASE_HASH => "Hashing complete",
                _ => "Verification complete",
            };
            pb.finish_with_message(message);
        }
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len + 4 > max_len {
        let keep = max_len.saturating_sub(3);
        let tail: String = file_name.chars().skip(name_len.saturating_sub(keep)).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
