//! Process exit codes.

use crate::duplicates::FinderError;
use crate::index::IndexError;

/// Exit codes for the dupefiles binary.
///
/// - 0: Success (command completed; a scan found duplicates)
/// - 1: General error (unexpected failure)
/// - 2: No duplicates found by a scan
/// - 3: Partial success (some files were skipped after read errors)
/// - 4: The index store could not be opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Success: the command completed.
    Success = 0,
    /// General error: an unexpected error occurred.
    GeneralError = 1,
    /// No duplicates: a scan completed without finding any.
    NoDuplicates = 2,
    /// Partial success: completed, but some files could not be read.
    PartialSuccess = 3,
    /// Store unavailable: the index could not be opened or initialized.
    StoreUnavailable = 4,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DF000",
            Self::GeneralError => "DF001",
            Self::NoDuplicates => "DF002",
            Self::PartialSuccess => "DF003",
            Self::StoreUnavailable => "DF004",
        }
    }

    /// Exit code for an error that ended the run.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        let index_error = err.downcast_ref::<IndexError>().or_else(|| {
            err.downcast_ref::<FinderError>().and_then(|e| match e {
                FinderError::Index(inner) => Some(inner),
                FinderError::ThreadPool(_) => None,
            })
        });
        match index_error {
            Some(IndexError::StoreUnavailable { .. }) => Self::StoreUnavailable,
            _ => Self::GeneralError,
        }
    }
}
