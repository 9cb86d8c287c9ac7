//! Collaborator seams: where messages and media bytes come from
//!
//! The pipeline never talks to a messaging service directly. It consumes a
//! [`MessageSource`] for the history and a [`MediaTransfer`] for the bytes of a
//! single attachment. [`export`] provides both on top of a channel history export.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::io::AsyncWrite;

use crate::config::Order;
use crate::error::{Result, TransferError};
use crate::progress::DownloadTrack;
use crate::types::{Attachment, ChannelInfo, Message};

pub mod export;

pub use export::ExportSource;

/// Finite, forward-only history of one channel
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Channel title, id and latest activity
    async fn channel_info(&self) -> Result<ChannelInfo>;

    /// Lazily yield at most `limit` messages in the requested order, each at most once
    fn messages(&self, limit: Option<usize>, order: Order) -> BoxStream<'_, Message>;
}

/// Raw byte transfer for one attachment
///
/// Implementations must tolerate being called again for the same attachment
/// against a freshly truncated destination.
#[async_trait]
pub trait MediaTransfer: Send + Sync {
    /// Stream the attachment's bytes into `destination`, reporting progress on `track`
    ///
    /// Returns the number of bytes written.
    async fn transfer(
        &self,
        attachment: &Attachment,
        destination: &mut (dyn AsyncWrite + Send + Unpin),
        track: &dyn DownloadTrack,
    ) -> std::result::Result<u64, TransferError>;
}
