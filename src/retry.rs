//! Retry logic with configurable backoff
//!
//! Runs an async operation until it succeeds, the attempt bound of the
//! [`BackoffPolicy`] is reached, or the run is cancelled. Cancellation is only
//! observed between attempts: an attempt that has started always runs to
//! completion or failure.
//!
//! # Example
//!
//! ```no_run
//! use channel_dl::config::BackoffPolicy;
//! use channel_dl::error::TransferError;
//! use channel_dl::retry::with_retry;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), TransferError> {
//! let policy = BackoffPolicy::default();
//! let cancel = CancellationToken::new();
//! let bytes = with_retry(&policy, &cancel, |_attempt| async {
//!     Ok::<u64, TransferError>(1024)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::BackoffPolicy;
use crate::error::{TransferError, TransferErrorKind};

/// Trait for errors that can be classified as transient or permanent
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation may succeed on retry
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for TransferError {
    fn is_retryable(&self) -> bool {
        match self.kind {
            TransferErrorKind::Network | TransferErrorKind::Protocol | TransferErrorKind::Io => {
                true
            }
            // Retrying cannot grant access or make missing media appear
            TransferErrorKind::Permission | TransferErrorKind::NotFound => false,
        }
    }
}

/// Execute an async operation under a backoff policy
///
/// `operation` receives the 1-based attempt number. Every error is retried unless
/// `policy.retry_permanent_errors` is off, in which case errors whose
/// [`IsRetryable::is_retryable`] is false fail immediately.
///
/// Returns the first success, or the last error once attempts are exhausted or
/// cancellation is requested while waiting to retry.
pub async fn with_retry<F, Fut, T, E>(
    policy: &BackoffPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt >= max_attempts {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        "Operation failed after all retry attempts exhausted"
                    );
                    return Err(e);
                }
                if !policy.retry_permanent_errors && !e.is_retryable() {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                    return Err(e);
                }
                if cancel.is_cancelled() {
                    tracing::warn!(error = %e, attempt, "Cancelled, not retrying");
                    return Err(e);
                }

                let delay = policy.delay_after(attempt);
                let delay = if policy.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        tracing::warn!(error = %e, attempt, "Cancelled during backoff");
                        return Err(e);
                    }
                }

                attempt += 1;
            }
        }
    }
}

/// Add random jitter to a delay
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
