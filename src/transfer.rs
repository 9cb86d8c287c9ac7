//! Transfer executor
//!
//! Writes one attachment to its destination with bounded retry. Every attempt
//! reopens and truncates the destination, so bytes from a failed attempt are
//! superseded rather than appended to. A destination left behind by a
//! terminally failed transfer is removed; the pipeline only calls the executor
//! for destinations that did not exist beforehand.

use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::config::BackoffPolicy;
use crate::error::TransferError;
use crate::progress::{DownloadTrack, ProgressReporter};
use crate::retry::with_retry;
use crate::source::MediaTransfer;
use crate::types::{Message, TransferOutcome};

/// Runs transfers under a [`BackoffPolicy`]
pub struct TransferExecutor {
    transport: Arc<dyn MediaTransfer>,
    policy: BackoffPolicy,
    progress: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

impl TransferExecutor {
    /// Create an executor
    pub fn new(
        transport: Arc<dyn MediaTransfer>,
        policy: BackoffPolicy,
        progress: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            policy,
            progress,
            cancel,
        }
    }

    /// Transfer the attachment of `message` to `destination`
    ///
    /// Returns [`TransferOutcome::Downloaded`] or [`TransferOutcome::Failed`].
    pub async fn transfer(
        &self,
        message: &Message,
        filename: &str,
        destination: &Path,
    ) -> TransferOutcome {
        let Some(attachment) = message.attachment.as_ref() else {
            return TransferOutcome::Failed(TransferError::protocol("message has no attachment"));
        };

        let track = self.progress.begin_download(filename, attachment.size());
        let track: &dyn DownloadTrack = track.as_ref();
        let max_attempts = self.policy.max_attempts;

        let result = with_retry(&self.policy, &self.cancel, |attempt| async move {
            if attempt > 1 {
                track.restart();
                self.progress.note(&format!(
                    "Retrying download {filename} ({}/{max_attempts})",
                    attempt - 1
                ));
            }
            tracing::debug!(
                message_id = message.id.get(),
                filename,
                attempt,
                "Starting transfer attempt"
            );
            self.attempt(attachment, destination, track).await
        })
        .await;

        match result {
            Ok(bytes) => TransferOutcome::Downloaded {
                path: destination.to_path_buf(),
                bytes,
            },
            Err(e) => {
                remove_partial(destination).await;
                TransferOutcome::Failed(e)
            }
        }
    }

    async fn attempt(
        &self,
        attachment: &crate::types::Attachment,
        destination: &Path,
        track: &dyn DownloadTrack,
    ) -> Result<u64, TransferError> {
        let mut file = tokio::fs::File::create(destination).await?;
        let bytes = self.transport.transfer(attachment, &mut file, track).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(bytes)
    }
}

async fn remove_partial(destination: &Path) {
    match tokio::fs::remove_file(destination).await {
        Ok(()) => {
            tracing::debug!(path = %destination.display(), "Removed partial download");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(
                path = %destination.display(),
                error = %e,
                "Failed to remove partial download"
            );
        }
    }
}
