//! Core types for channel-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::TransferError;

/// Unique identifier for a message within a channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl MessageId {
    /// Create a new MessageId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attribute attached to a generic document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentAttribute {
    /// Explicit filename declared by the sender
    Filename {
        /// The declared name, as sent
        file_name: String,
    },
    /// Audio metadata
    Audio {
        /// Track duration in seconds
        duration: Option<u32>,
        /// Track title
        title: Option<String>,
    },
    /// Video metadata
    Video {
        /// Clip duration in seconds
        duration: Option<u32>,
    },
    /// Sticker marker
    Sticker,
}

/// Where the bytes of an attachment can be fetched from
///
/// Opaque to the pipeline; only the [`MediaTransfer`](crate::source::MediaTransfer)
/// implementation that produced it interprets it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaRef {
    /// Path relative to the source's media root
    Path(PathBuf),
    /// The media exists on the channel but its bytes are not available to this source
    Unavailable(String),
}

/// The media payload carried by a message
///
/// Closed set: a new kind of media means a new variant and a new case in
/// [`classify`](crate::classifier::classify).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attachment {
    /// Compressed photo; never carries a filename
    Photo {
        /// Size in bytes, when known
        size: Option<u64>,
        /// Location of the bytes
        media: MediaRef,
    },
    /// Generic document (files, audio, video, voice notes, stickers)
    Document {
        /// Declared attributes, in the order the sender attached them
        attributes: Vec<DocumentAttribute>,
        /// MIME type hint, when provided
        mime_type: Option<String>,
        /// Size in bytes, when known
        size: Option<u64>,
        /// Location of the bytes
        media: MediaRef,
    },
    /// Media without a downloadable payload (locations, polls, contacts, ...)
    Unsupported {
        /// Source-specific name of the media kind
        kind: String,
    },
}

impl Attachment {
    /// Declared size in bytes, when known
    pub fn size(&self) -> Option<u64> {
        match self {
            Attachment::Photo { size, .. } | Attachment::Document { size, .. } => *size,
            Attachment::Unsupported { .. } => None,
        }
    }

    /// Location of the bytes, if this attachment has any
    pub fn media(&self) -> Option<&MediaRef> {
        match self {
            Attachment::Photo { media, .. } | Attachment::Document { media, .. } => Some(media),
            Attachment::Unsupported { .. } => None,
        }
    }
}

/// A channel message as produced by a [`MessageSource`](crate::source::MessageSource)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier
    pub id: MessageId,
    /// When the message was posted, if known
    pub date: Option<DateTime<Utc>>,
    /// Media payload, if any
    pub attachment: Option<Attachment>,
}

impl Message {
    /// Message without media
    pub fn text(id: i64) -> Self {
        Self {
            id: MessageId(id),
            date: None,
            attachment: None,
        }
    }

    /// Message carrying the given attachment
    pub fn with_attachment(id: i64, attachment: Attachment) -> Self {
        Self {
            id: MessageId(id),
            date: None,
            attachment: Some(attachment),
        }
    }
}

/// Basic information about the channel being read
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Channel identifier as known to the source
    pub id: i64,
    /// Display title
    pub title: String,
    /// Date of the most recent message, if any
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Filename and extension resolved for one attachment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    /// Destination filename (no directory components)
    pub filename: String,
    /// Lowercase extension without leading dot, `unknown` when no signal exists
    pub extension: String,
}

/// Result of classifying a message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    /// The message carries no attachment
    NoAttachment,
    /// The message carries media but no usable filename could be derived
    UnresolvableFilename,
    /// A filename and extension were derived
    Resolved(AttachmentDescriptor),
}

/// Why a message was skipped without transferring
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The destination file already exists on disk
    AlreadyExists,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AlreadyExists => f.write_str("already exists"),
        }
    }
}

/// Terminal outcome for a message that reached classification
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The file was written to the destination
    Downloaded {
        /// Final destination path
        path: PathBuf,
        /// Bytes written
        bytes: u64,
    },
    /// Nothing was transferred
    Skipped(SkipReason),
    /// The extension is not in the allow-list
    Filtered,
    /// Every allowed attempt failed
    Failed(TransferError),
}

impl TransferOutcome {
    /// Short lowercase name, used in logs
    pub fn label(&self) -> &'static str {
        match self {
            TransferOutcome::Downloaded { .. } => "downloaded",
            TransferOutcome::Skipped(_) => "skipped",
            TransferOutcome::Filtered => "filtered",
            TransferOutcome::Failed(_) => "failed",
        }
    }
}
