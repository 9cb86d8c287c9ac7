//! # channel-dl
//!
//! Bulk media downloader for the history of a messaging channel.
//!
//! Every message of the history passes through the same pipeline:
//! - **classify** the attachment into a destination filename and extension,
//! - **filter** the extension against an allow-list (or accept everything),
//! - **skip** destinations that already exist, so re-runs only fetch what is new,
//! - **transfer** the bytes with bounded retry and backoff,
//! - **count** the terminal outcome and advance progress.
//!
//! The messaging service itself stays behind two traits,
//! [`MessageSource`](source::MessageSource) and [`MediaTransfer`](source::MediaTransfer).
//! [`ExportSource`](source::ExportSource) implements both on top of a channel
//! history export.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use channel_dl::{Config, ExportSource, MessageSource, NoProgress, Pipeline};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.source.channel = "exports/MyChannel".to_string();
//!     config.filter.allowed_formats = vec!["mp3".into(), "flac".into()];
//!     config.validate()?;
//!
//!     let source = Arc::new(ExportSource::open(&config.source.channel).await?);
//!     let config = Arc::new(config);
//!     let pipeline = Pipeline::new(
//!         config.clone(),
//!         source.clone(),
//!         Arc::new(NoProgress),
//!         CancellationToken::new(),
//!     );
//!     pipeline.prepare().await?;
//!
//!     let messages = source.messages(config.source.history_limit, config.source.order);
//!     let report = pipeline.run(messages, None).await;
//!     println!("{}", report.stats);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Attachment classification
pub mod classifier;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Format filter
pub mod filter;
/// Pipeline driver
pub mod pipeline;
/// Progress reporting
pub mod progress;
/// Retry logic with backoff
pub mod retry;
/// Operator interrupt handling
pub mod shutdown;
/// Message sources and media transfer
pub mod source;
/// Download statistics
pub mod stats;
/// Transfer executor
pub mod transfer;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::{BackoffPolicy, Config, FilterConfig, Order};
pub use error::{Error, Result, TransferError, TransferErrorKind};
pub use filter::FormatFilter;
pub use pipeline::{Pipeline, RunReport};
pub use progress::{DownloadTrack, NoProgress, ProgressReporter, TerminalProgress};
pub use source::{ExportSource, MediaTransfer, MessageSource};
pub use stats::{DownloadStats, StatsSnapshot};
pub use transfer::TransferExecutor;
pub use types::{
    Attachment, AttachmentDescriptor, ChannelInfo, Classification, DocumentAttribute, MediaRef,
    Message, MessageId, SkipReason, TransferOutcome,
};
