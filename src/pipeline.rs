//! Pipeline driver
//!
//! Pulls messages from a stream and runs each one through
//! classify → filter → existence check → transfer, recording the terminal
//! outcome and advancing the overall progress track once per message.
//!
//! With `concurrency = 1` messages are processed strictly in stream order, so
//! when two messages resolve to the same destination the first one wins. With
//! more workers, [`PathClaims`] serializes the existence check and write for
//! each destination path: a worker whose destination is held by another waits
//! for it, then checks the disk again, so a failed first writer leaves the path
//! to the next message exactly as a sequential run would.

use futures::StreamExt;
use futures::stream::BoxStream;
use humansize::{DECIMAL, format_size};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

use crate::classifier::classify;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::filter::FormatFilter;
use crate::progress::ProgressReporter;
use crate::source::MediaTransfer;
use crate::stats::{DownloadStats, StatsSnapshot};
use crate::transfer::TransferExecutor;
use crate::types::{AttachmentDescriptor, Classification, Message, SkipReason, TransferOutcome};

/// Final result of [`Pipeline::run`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunReport {
    /// Outcome counters
    pub stats: StatsSnapshot,
    /// Messages pulled from the stream and fully processed, with or without attachment
    pub processed: u64,
    /// Whether the run stopped because cancellation was requested
    pub cancelled: bool,
}

/// The media ingestion pipeline for one run
pub struct Pipeline {
    config: Arc<Config>,
    output_dir: PathBuf,
    filter: FormatFilter,
    executor: TransferExecutor,
    stats: DownloadStats,
    claims: PathClaims,
    progress: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Build a pipeline; nothing touches the disk until [`Pipeline::prepare`]
    pub fn new(
        config: Arc<Config>,
        transport: Arc<dyn MediaTransfer>,
        progress: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Self {
        let executor = TransferExecutor::new(
            transport,
            config.retry.clone(),
            progress.clone(),
            cancel.clone(),
        );

        Self {
            output_dir: config.output_dir(),
            filter: FormatFilter::new(&config.filter),
            executor,
            stats: DownloadStats::new(),
            claims: PathClaims::default(),
            progress,
            cancel,
            config,
        }
    }

    /// Destination root for this run
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The format filter in use
    pub fn filter(&self) -> &FormatFilter {
        &self.filter
    }

    /// Create the output directory if needed
    ///
    /// This is the last point at which the run can fail as a whole.
    pub async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| Error::OutputDir {
                path: self.output_dir.clone(),
                source,
            })?;

        let metadata = tokio::fs::metadata(&self.output_dir)
            .await
            .map_err(|source| Error::OutputDir {
                path: self.output_dir.clone(),
                source,
            })?;
        if metadata.permissions().readonly() {
            return Err(Error::OutputDir {
                path: self.output_dir.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "directory is read-only",
                ),
            });
        }
        Ok(())
    }

    /// Process every message of `messages`, stopping early on cancellation
    ///
    /// `total_hint` sizes the overall progress track; it is the configured
    /// history limit, not a discovered count.
    pub async fn run(&self, messages: BoxStream<'_, Message>, total_hint: Option<u64>) -> RunReport {
        let processed = AtomicU64::new(0);
        let workers = self.config.download.concurrency.max(1);
        self.progress.start(total_hint);

        messages
            .take_until(self.cancel.cancelled())
            .for_each_concurrent(workers, |message| {
                let processed = &processed;
                async move {
                    if let Some(outcome) = self.process(&message).await {
                        self.stats.record(&outcome);
                    }
                    self.progress.advance();
                    processed.fetch_add(1, Ordering::Relaxed);
                }
            })
            .await;

        let cancelled = self.cancel.is_cancelled();
        self.progress.finish(if cancelled {
            "Cancelled"
        } else {
            "Download complete"
        });

        let report = RunReport {
            stats: self.stats.snapshot(),
            processed: processed.into_inner(),
            cancelled,
        };
        tracing::info!(
            processed = report.processed,
            downloaded = report.stats.total_downloads,
            skipped = report.stats.skipped_files,
            filtered = report.stats.filtered_files,
            failed = report.stats.failed_downloads,
            cancelled,
            "Run finished"
        );
        report
    }

    /// Run one message through the pipeline
    ///
    /// Returns `None` for messages that never reach a terminal outcome: no
    /// attachment, or no usable filename. Statistics are not touched here.
    pub async fn process(&self, message: &Message) -> Option<TransferOutcome> {
        let descriptor = match classify(message) {
            Classification::NoAttachment => return None,
            Classification::UnresolvableFilename => {
                tracing::debug!(message_id = message.id.get(), "Could not determine filename");
                return None;
            }
            Classification::Resolved(descriptor) => descriptor,
        };

        let outcome = self.dispatch(message, &descriptor).await;
        self.report(message, &descriptor, &outcome);
        Some(outcome)
    }

    /// Current counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    async fn dispatch(&self, message: &Message, descriptor: &AttachmentDescriptor) -> TransferOutcome {
        if !self.filter.should_download(&descriptor.extension) {
            return TransferOutcome::Filtered;
        }

        let destination = self.output_dir.join(&descriptor.filename);
        let _claim = self.claims.claim(&destination).await;
        match tokio::fs::try_exists(&destination).await {
            Ok(true) => return TransferOutcome::Skipped(SkipReason::AlreadyExists),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    message_id = message.id.get(),
                    path = %destination.display(),
                    error = %e,
                    "Could not check destination"
                );
                return TransferOutcome::Failed(e.into());
            }
        }

        self.executor
            .transfer(message, &descriptor.filename, &destination)
            .await
    }

    fn report(&self, message: &Message, descriptor: &AttachmentDescriptor, outcome: &TransferOutcome) {
        let debug = self.config.download.debug;
        let filename = descriptor.filename.as_str();
        let message_id = message.id.get();

        match outcome {
            TransferOutcome::Downloaded { path, bytes } => {
                tracing::info!(message_id, path = %path.display(), bytes, "Downloaded");
                self.progress.note(&format!(
                    "Downloaded: {filename} ({})",
                    format_size(*bytes, DECIMAL)
                ));
            }
            TransferOutcome::Filtered => {
                tracing::debug!(message_id, filename, extension = %descriptor.extension, "Filtered");
                if debug {
                    self.progress
                        .note(&format!("File format not allowed: {filename}"));
                }
            }
            TransferOutcome::Skipped(reason) => {
                tracing::debug!(message_id, filename, %reason, "Skipped");
                if debug {
                    self.progress.note(&format!(
                        "Skipped: {} ({reason})",
                        self.output_dir.join(filename).display()
                    ));
                }
            }
            TransferOutcome::Failed(e) => {
                tracing::warn!(message_id, filename, error = %e, "Download failed");
                self.progress.note(&format!(
                    "Error downloading {filename}: {} - {}",
                    e.kind, e.detail
                ));
            }
        }
    }
}

/// Per-destination locks held while a worker checks and writes a path
#[derive(Debug, Default)]
pub struct PathClaims {
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl PathClaims {
    /// Claim `path`, waiting while another worker holds it
    pub async fn claim(&self, path: &Path) -> PathClaim<'_> {
        let lock = self
            .locks()
            .entry(path.to_path_buf())
            .or_default()
            .clone();
        let guard = lock.clone().lock_owned().await;

        PathClaim {
            owner: self,
            path: path.to_path_buf(),
            lock,
            guard: Some(guard),
        }
    }

    /// Number of paths with a holder or waiters
    pub fn len(&self) -> usize {
        self.locks().len()
    }

    /// Whether no path is claimed
    pub fn is_empty(&self) -> bool {
        self.locks().is_empty()
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>> {
        match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Held while a destination is checked and written; released on drop
#[derive(Debug)]
pub struct PathClaim<'a> {
    owner: &'a PathClaims,
    path: PathBuf,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PathClaim<'_> {
    fn drop(&mut self) {
        // Release first so a waiter can proceed
        self.guard.take();

        // Only the map and this claim reference the lock: nobody is waiting
        let mut locks = self.owner.locks();
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[tokio::test]
    async fn second_claim_waits_for_release() {
        let claims = PathClaims::default();
        let path = Path::new("/out/a.mp3");

        let first = claims.claim(path).await;
        let _other = claims.claim(Path::new("/out/b.mp3")).await;

        let waiting = tokio::time::timeout(Duration::from_millis(20), claims.claim(path)).await;
        assert!(waiting.is_err(), "second claim must wait while the first is held");

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(1), claims.claim(path)).await;
        assert!(second.is_ok(), "released on drop");
    }

    #[tokio::test]
    async fn released_claims_are_forgotten() {
        let claims = PathClaims::default();
        let claim = claims.claim(Path::new("/out/a.mp3")).await;
        assert_eq!(claims.len(), 1);

        drop(claim);
        assert!(claims.is_empty());
    }
}
