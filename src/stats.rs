//! Download statistics
//!
//! Four monotonic counters, one per terminal outcome. Counters are atomic so
//! concurrent workers can record outcomes without a lock.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::TransferOutcome;

/// Live counters for one run
#[derive(Debug, Default)]
pub struct DownloadStats {
    total_downloads: AtomicU64,
    skipped_files: AtomicU64,
    filtered_files: AtomicU64,
    failed_downloads: AtomicU64,
}

impl DownloadStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one terminal outcome
    pub fn record(&self, outcome: &TransferOutcome) {
        let counter = match outcome {
            TransferOutcome::Downloaded { .. } => &self.total_downloads,
            TransferOutcome::Skipped(_) => &self.skipped_files,
            TransferOutcome::Filtered => &self.filtered_files,
            TransferOutcome::Failed(_) => &self.failed_downloads,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_downloads: self.total_downloads.load(Ordering::Relaxed),
            skipped_files: self.skipped_files.load(Ordering::Relaxed),
            filtered_files: self.filtered_files.load(Ordering::Relaxed),
            failed_downloads: self.failed_downloads.load(Ordering::Relaxed),
        }
    }
}

/// Immutable copy of [`DownloadStats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Files written to disk
    pub total_downloads: u64,
    /// Files whose destination already existed
    pub skipped_files: u64,
    /// Files rejected by the format filter
    pub filtered_files: u64,
    /// Files that failed on every attempt
    pub failed_downloads: u64,
}

impl StatsSnapshot {
    /// Number of messages that reached a terminal outcome
    pub fn total(&self) -> u64 {
        self.total_downloads + self.skipped_files + self.filtered_files + self.failed_downloads
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Completed: {} files downloaded", self.total_downloads)?;
        writeln!(f, "Skipped: {} existing files", self.skipped_files)?;
        writeln!(f, "Filtered: {} files (wrong format)", self.filtered_files)?;
        write!(f, "Failed: {} downloads", self.failed_downloads)
    }
}
