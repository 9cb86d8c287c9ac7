//! In-memory channel with scripted transfer failures

use async_trait::async_trait;
use channel_dl::{
    Attachment, ChannelInfo, DocumentAttribute, DownloadTrack, MediaRef, MediaTransfer, Message,
    MessageSource, Order, TransferError,
};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Channel whose history and media live in memory
#[derive(Default)]
pub struct MemoryChannel {
    messages: Vec<Message>,
    payloads: HashMap<PathBuf, Vec<u8>>,
    failures: Mutex<HashMap<PathBuf, u32>>,
    calls: Mutex<HashMap<PathBuf, u32>>,
    cancel_on_transfer: Option<CancellationToken>,
}

impl MemoryChannel {
    /// Channel holding `messages`, oldest first
    pub fn new(messages: Vec<Message>) -> Self {
        let payloads = messages
            .iter()
            .filter_map(|m| match m.attachment.as_ref()?.media()? {
                MediaRef::Path(path) => Some((path.clone(), payload_for(m.id.get()))),
                MediaRef::Unavailable(_) => None,
            })
            .collect();
        Self {
            messages,
            payloads,
            ..Default::default()
        }
    }

    /// Fail the first `times` transfers of message `id`
    pub fn fail(self, id: i64, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(media_path(id), times);
        self
    }

    /// Cancel `token` as soon as the first transfer starts
    pub fn cancel_on_transfer(mut self, token: CancellationToken) -> Self {
        self.cancel_on_transfer = Some(token);
        self
    }

    /// Number of transfer attempts made for message `id`
    pub fn calls(&self, id: i64) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(&media_path(id))
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageSource for MemoryChannel {
    async fn channel_info(&self) -> channel_dl::Result<ChannelInfo> {
        Ok(ChannelInfo {
            id: 1,
            title: "Test Channel".to_string(),
            last_message_at: None,
        })
    }

    fn messages(&self, limit: Option<usize>, order: Order) -> BoxStream<'_, Message> {
        let limit = limit.unwrap_or(usize::MAX);
        match order {
            Order::OldestFirst => {
                futures::stream::iter(self.messages.iter().take(limit).cloned()).boxed()
            }
            Order::NewestFirst => {
                futures::stream::iter(self.messages.iter().rev().take(limit).cloned()).boxed()
            }
        }
    }
}

#[async_trait]
impl MediaTransfer for MemoryChannel {
    async fn transfer(
        &self,
        attachment: &Attachment,
        destination: &mut (dyn AsyncWrite + Send + Unpin),
        track: &dyn DownloadTrack,
    ) -> Result<u64, TransferError> {
        if let Some(token) = &self.cancel_on_transfer {
            token.cancel();
        }

        let path = match attachment.media() {
            Some(MediaRef::Path(path)) => path.clone(),
            _ => return Err(TransferError::not_found("no media")),
        };
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let entry = calls.entry(path.clone()).or_default();
            *entry += 1;
            *entry
        };

        let failures = self
            .failures
            .lock()
            .unwrap()
            .get(&path)
            .copied()
            .unwrap_or_default();
        if call <= failures {
            destination.write_all(b"partial").await?;
            return Err(TransferError::network(format!("connection reset (call {call})")));
        }

        let payload = self
            .payloads
            .get(&path)
            .ok_or_else(|| TransferError::not_found(path.display().to_string()))?;
        for chunk in payload.chunks(4) {
            destination.write_all(chunk).await?;
            track.update(chunk.len() as u64);
            tokio::task::yield_now().await;
        }
        Ok(payload.len() as u64)
    }
}

/// Bytes served for message `id`
pub fn payload_for(id: i64) -> Vec<u8> {
    format!("payload of message {id}").into_bytes()
}

fn media_path(id: i64) -> PathBuf {
    PathBuf::from(format!("media/{id}"))
}

/// Document with a declared filename
pub fn document(id: i64, file_name: &str) -> Message {
    Message::with_attachment(
        id,
        Attachment::Document {
            attributes: vec![DocumentAttribute::Filename {
                file_name: file_name.to_string(),
            }],
            mime_type: None,
            size: Some(payload_for(id).len() as u64),
            media: MediaRef::Path(media_path(id)),
        },
    )
}

/// Document without a filename, only a MIME type
pub fn unnamed_document(id: i64, mime_type: &str) -> Message {
    Message::with_attachment(
        id,
        Attachment::Document {
            attributes: vec![],
            mime_type: Some(mime_type.to_string()),
            size: None,
            media: MediaRef::Path(media_path(id)),
        },
    )
}

/// Photo without a filename
pub fn photo(id: i64) -> Message {
    Message::with_attachment(
        id,
        Attachment::Photo {
            size: Some(payload_for(id).len() as u64),
            media: MediaRef::Path(media_path(id)),
        },
    )
}

/// Media without a downloadable payload
pub fn poll(id: i64) -> Message {
    Message::with_attachment(
        id,
        Attachment::Unsupported {
            kind: "poll".to_string(),
        },
    )
}
