//! Duplicate scanner orchestrating the three-stage detection pipeline.
//!
//! # Overview
//!
//! 1. **Size partition**: records are grouped by exact size; unique sizes
//!    are dropped with no I/O (see [`crate::duplicates::groups`]).
//! 2. **Content hashing**: members of size groups that lack a usable stored
//!    hash are hashed on a bounded rayon pool. New hashes are committed to
//!    the index in one transaction and only then applied in memory.
//! 3. **Verification**: each `(size, hash)` bucket with two or more members
//!    compares every member against its anchor, fully or by sampling.
//!    Buckets run concurrently under a [`CountBudget`]; confirmed sets are
//!    recorded as duplicate membership, one transaction per bucket.
//!
//! Per-file read errors in stages 2 and 3 are logged and the file is left
//! out of this scan's results. Store errors are returned after every bucket
//! has finished.
//!
//! # Example
//!
//! ```no_run
//! use dupefiles::config::Config;
//! use dupefiles::duplicates::{DuplicateScanner, ScanConfig};
//! use dupefiles::index::FileIndex;
//!
//! let config = Config::default();
//! let scanner = DuplicateScanner::new(ScanConfig::from_config(&config));
//! let mut index = FileIndex::open(config).unwrap();
//!
//! let (groups, summary) = scanner.scan_for_duplicates(&mut index).unwrap();
//! println!("Found {} duplicate groups", groups.len());
//! println!("Reclaimable space: {}", summary.reclaimable_display());
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver};
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::budget::CountBudget;
use super::groups::{group_by_size, Candidate, HashBucket, HashBuckets, ResultGroup};
use crate::config::Config;
use crate::index::{human_size, FileIndex, IndexError};
use crate::progress::{ProgressCallback, PHASE_HASH, PHASE_VERIFY};
use crate::scanner::{compare_files, compute_content_hash, ContentHash, HashPolicy, SampleMode};

/// Configuration for a duplicate scan.
#[derive(Clone)]
pub struct ScanConfig {
    /// Upper bound on hashing threads, comparison threads and concurrently
    /// verified buckets.
    pub workers: usize,
    /// Bytes sampled per comparison; 0 compares whole files.
    pub sample_size: u64,
    /// How sampled comparison picks positions.
    pub sample_mode: SampleMode,
    /// Digest selection by file size.
    pub hash_policy: HashPolicy,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanConfig")
            .field("workers", &self.workers)
            .field("sample_size", &self.sample_size)
            .field("sample_mode", &self.sample_mode)
            .field("hash_policy", &self.hash_policy)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ScanConfig {
    /// Take the scan settings from a resolved [`Config`].
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.effective_workers(),
            sample_size: config.sample_size,
            sample_mode: config.sample_mode,
            hash_policy: config.hash_policy,
            progress_callback: None,
        }
    }

    /// Set the worker bound. 0 is treated as 1.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the comparison sample size.
    #[must_use]
    pub fn with_sample_size(mut self, sample_size: u64) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Set the sampling mode.
    #[must_use]
    pub fn with_sample_mode(mut self, mode: SampleMode) -> Self {
        self.sample_mode = mode;
        self
    }

    /// Set the hash policy.
    #[must_use]
    pub fn with_hash_policy(mut self, policy: HashPolicy) -> Self {
        self.hash_policy = policy;
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }
}

/// Summary statistics from a duplicate scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Records in the index when the scan started
    pub total_records: usize,
    /// Records sharing their size with at least one other record
    pub size_candidates: usize,
    /// Stored hashes reused without reading the file
    pub cached_hashes: usize,
    /// Hashes computed during this scan
    pub hashes_computed: usize,
    /// Files that could not be hashed
    pub hash_failures: usize,
    /// Comparisons that failed on a read error
    pub compare_failures: usize,
    /// Confirmed duplicate groups
    pub duplicate_groups: usize,
    /// Duplicate files, excluding each group's anchor
    pub duplicate_files: usize,
    /// Bytes freed by keeping only anchors
    pub reclaimable_bytes: u64,
    /// Wall time of the scan
    pub scan_duration: Duration,
}

impl ScanSummary {
    /// Whether any file was skipped because of a read error.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.hash_failures > 0 || self.compare_failures > 0
    }

    /// Reclaimable space as a human-readable string.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        human_size(self.reclaimable_bytes)
    }
}

/// Errors that abort a duplicate scan.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// Reading from or writing to the index failed.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// A worker pool could not be started.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result of verifying one hash bucket.
struct BucketOutcome {
    anchor: String,
    group: Option<ResultGroup>,
    compare_failures: usize,
    error: Option<IndexError>,
}

/// Runs the size, hash and verify stages over a [`FileIndex`].
#[derive(Debug, Default)]
pub struct DuplicateScanner {
    config: ScanConfig,
}

impl DuplicateScanner {
    /// Create a scanner.
    #[must_use]
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// The scan configuration.
    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Find, verify and record duplicate groups.
    ///
    /// Membership rows not confirmed by this scan are dropped once every
    /// bucket has been recorded.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::Index`] if hashes or membership could not be
    /// committed, or [`FinderError::ThreadPool`] if a pool fails to start.
    pub fn scan_for_duplicates(
        &self,
        index: &mut FileIndex,
    ) -> Result<(Vec<ResultGroup>, ScanSummary), FinderError> {
        let start = Instant::now();
        let mut summary = ScanSummary {
            total_records: index.len(),
            ..ScanSummary::default()
        };

        // Stage 1
        let candidates: Vec<Candidate> = index
            .all_records()
            .into_iter()
            .map(Candidate::from_record)
            .collect();
        let (size_groups, stats) = group_by_size(candidates);
        summary.size_candidates = stats.potential_duplicates;
        log::info!(
            "Stage 1: {} of {} records share a size ({} size groups)",
            stats.potential_duplicates,
            stats.total_files,
            size_groups.len()
        );

        // Stage 2
        let policy = self.config.hash_policy;
        let mut buckets = HashBuckets::new();
        let mut pending = Vec::new();
        for candidate in size_groups.into_iter().flat_map(|g| g.members) {
            if candidate.hash.needs_hashing(&policy, candidate.size) {
                pending.push(candidate);
                continue;
            }
            if let Some(hash) = candidate.hash.as_hash().cloned() {
                log::trace!("Using stored hash: {}", candidate.path.display());
                summary.cached_hashes += 1;
                buckets.insert(candidate, hash);
            }
        }

        log::info!(
            "Stage 2: {} stored hashes reused, {} files to hash",
            summary.cached_hashes,
            pending.len()
        );
        let (hashed, hash_failures) = self.hash_candidates(pending)?;
        summary.hash_failures = hash_failures;
        summary.hashes_computed = hashed.len();

        let write_back: Vec<(String, ContentHash)> = hashed
            .iter()
            .map(|(candidate, hash)| (candidate.identity.clone(), hash.clone()))
            .collect();
        index.apply_hashes(&write_back)?;
        for (candidate, hash) in hashed {
            buckets.insert(candidate, hash);
        }

        // Stage 3
        let buckets = buckets.into_verifiable();
        log::info!("Stage 3: verifying {} hash buckets", buckets.len());
        let index: &FileIndex = index;
        let (mut groups, compare_failures, error) = self.verify_buckets(index, buckets)?;
        summary.compare_failures = compare_failures;

        if let Some(e) = error {
            return Err(e.into());
        }

        let confirmed: HashSet<String> = groups
            .iter()
            .flat_map(|g| g.members.iter().cloned())
            .collect();
        let pruned = index.retain_duplicates(&confirmed)?;
        if pruned > 0 {
            log::debug!("Dropped {} stale duplicate memberships", pruned);
        }

        groups.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.members.cmp(&b.members)));
        summary.duplicate_groups = groups.len();
        summary.duplicate_files = groups.iter().map(ResultGroup::duplicate_count).sum();
        summary.reclaimable_bytes = groups.iter().map(ResultGroup::reclaimable).sum();
        summary.scan_duration = start.elapsed();

        log::info!(
            "Scan complete: {} groups, {} duplicate files, {} reclaimable in {:?}",
            summary.duplicate_groups,
            summary.duplicate_files,
            summary.reclaimable_display(),
            summary.scan_duration
        );
        Ok((groups, summary))
    }

    /// Hash candidates on a bounded pool. Returns the hashed candidates and
    /// the number of failures.
    fn hash_candidates(
        &self,
        pending: Vec<Candidate>,
    ) -> Result<(Vec<(Candidate, ContentHash)>, usize), FinderError> {
        if pending.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let total = pending.len();
        let threads = self.config.workers.min(total).max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("df-hash-{i}"))
            .build()?;
        log::debug!("Hashing {} files on {} threads", total, threads);

        let callback = self.config.progress_callback.as_ref();
        if let Some(cb) = callback {
            cb.on_phase_start(PHASE_HASH, total);
        }

        let (tx, rx) = unbounded();
        let policy = self.config.hash_policy;
        let mut hashed = Vec::with_capacity(total);
        let mut failures = 0;

        std::thread::scope(|s| {
            let pool = &pool;
            s.spawn(move || {
                pool.scope(|scope| {
                    for candidate in pending {
                        let tx = tx.clone();
                        scope.spawn(move |_| {
                            let result =
                                compute_content_hash(&candidate.path, candidate.size, &policy);
                            let _ = tx.send((candidate, result));
                        });
                    }
                });
            });

            for (done, (candidate, result)) in rx.iter().enumerate() {
                if let Some(cb) = callback {
                    cb.on_progress(done + 1, &candidate.path.to_string_lossy());
                    cb.on_item_completed(candidate.size);
                }
                match result {
                    Ok(hash) => {
                        log::trace!("Hashed {}: {}", candidate.path.display(), hash);
                        hashed.push((candidate, hash));
                    }
                    Err(e) => {
                        log::warn!("Failed to hash {}: {}", candidate.path.display(), e);
                        failures += 1;
                    }
                }
            }
        });

        if let Some(cb) = callback {
            cb.on_phase_end(PHASE_HASH);
        }
        Ok((hashed, failures))
    }

    /// Verify every bucket, at most `workers` at a time.
    ///
    /// Returns the confirmed groups, the compare failure count and the first
    /// store error raised by any bucket.
    fn verify_buckets(
        &self,
        index: &FileIndex,
        buckets: Vec<HashBucket>,
    ) -> Result<(Vec<ResultGroup>, usize, Option<IndexError>), FinderError> {
        let mut groups = Vec::new();
        let mut compare_failures = 0;
        let mut first_error = None;
        if buckets.is_empty() {
            return Ok((groups, compare_failures, first_error));
        }

        let workers = self.config.workers.max(1);
        let compare_pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("df-compare-{i}"))
            .build()?;
        let budget = CountBudget::new(workers);
        let scanned_at = chrono::Utc::now().timestamp();

        let callback = self.config.progress_callback.as_ref();
        if let Some(cb) = callback {
            cb.on_phase_start(PHASE_VERIFY, buckets.len());
        }

        let (tx, rx) = unbounded::<BucketOutcome>();
        let mut done = 0;
        let mut absorb = |rx: &Receiver<BucketOutcome>, block: bool| {
            let outcomes: Vec<BucketOutcome> = if block {
                rx.iter().collect()
            } else {
                rx.try_iter().collect()
            };
            for outcome in outcomes {
                done += 1;
                if let Some(cb) = callback {
                    cb.on_progress(done, &outcome.anchor);
                }
                compare_failures += outcome.compare_failures;
                if let Some(group) = outcome.group {
                    groups.push(group);
                }
                if let Some(e) = outcome.error {
                    log::warn!("Failed to record duplicates of {}: {}", outcome.anchor, e);
                    first_error.get_or_insert(e);
                }
            }
        };

        std::thread::scope(|s| {
            let compare_pool = &compare_pool;
            for bucket in buckets {
                let permit = budget.acquire();
                let tx = tx.clone();
                s.spawn(move || {
                    let _permit = permit;
                    let outcome = self.verify_bucket(index, compare_pool, bucket, scanned_at);
                    let _ = tx.send(outcome);
                });
                absorb(&rx, false);
            }
            drop(tx);
            absorb(&rx, true);
        });

        if let Some(cb) = callback {
            cb.on_phase_end(PHASE_VERIFY);
        }
        Ok((groups, compare_failures, first_error))
    }

    /// Compare each member against the anchor and record the confirmed set.
    fn verify_bucket(
        &self,
        index: &FileIndex,
        pool: &ThreadPool,
        bucket: HashBucket,
        scanned_at: i64,
    ) -> BucketOutcome {
        let HashBucket {
            size,
            hash,
            members,
        } = bucket;
        let mut members = members.into_iter();
        let Some(anchor) = members.next() else {
            return BucketOutcome {
                anchor: String::new(),
                group: None,
                compare_failures: 0,
                error: None,
            };
        };
        let others: Vec<Candidate> = members.collect();

        let (tx, rx) = unbounded();
        let (sample_size, mode) = (self.config.sample_size, self.config.sample_mode);
        pool.scope(|scope| {
            for (position, member) in others.iter().enumerate() {
                let tx = tx.clone();
                let anchor = &anchor;
                scope.spawn(move |_| {
                    let verdict = compare_files(&anchor.path, &member.path, sample_size, mode);
                    let _ = tx.send((position, verdict));
                });
            }
        });
        drop(tx);

        let mut identical = vec![false; others.len()];
        let mut compare_failures = 0;
        for (position, verdict) in rx.iter() {
            match verdict {
                Ok(same) => identical[position] = same,
                Err(e) => {
                    log::warn!(
                        "Failed to compare {} with {}: {}",
                        others[position].path.display(),
                        anchor.path.display(),
                        e
                    );
                    compare_failures += 1;
                }
            }
        }

        let mut confirmed = vec![anchor.identity.clone()];
        confirmed.extend(
            others
                .iter()
                .zip(&identical)
                .filter(|(_, same)| **same)
                .map(|(member, _)| member.identity.clone()),
        );

        if confirmed.len() < 2 {
            log::debug!("No confirmed duplicates for {}", anchor.path.display());
            return BucketOutcome {
                anchor: anchor.identity,
                group: None,
                compare_failures,
                error: None,
            };
        }

        match index.record_duplicate_set(&confirmed, scanned_at) {
            Ok(_) => BucketOutcome {
                anchor: anchor.identity,
                group: Some(ResultGroup {
                    content_hash: hash,
                    size,
                    members: confirmed,
                }),
                compare_failures,
                error: None,
            },
            Err(e) => BucketOutcome {
                anchor: anchor.identity,
                group: None,
                compare_failures,
                error: Some(e),
            },
        }
    }
}
