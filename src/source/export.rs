//! Channel history export
//!
//! Reads the JSON history export of a channel (`result.json` with a `messages`
//! array, media files stored next to it under relative paths) and serves it
//! as both a [`MessageSource`] and a [`MediaTransfer`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{MediaTransfer, MessageSource};
use crate::config::Order;
use crate::error::{Error, Result, TransferError};
use crate::progress::DownloadTrack;
use crate::types::{
    Attachment, ChannelInfo, DocumentAttribute, MediaRef, Message, MessageId,
};

/// Name of the history file inside an export directory
pub const EXPORT_FILE: &str = "result.json";

const CHUNK_SIZE: usize = 64 * 1024;

/// History export loaded into memory, oldest message first
#[derive(Debug)]
pub struct ExportSource {
    root: PathBuf,
    info: ChannelInfo,
    messages: Vec<Message>,
}

impl ExportSource {
    /// Open an export directory, or a `result.json` file directly
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (root, file) = if path.extension().is_some_and(|ext| ext == "json") {
            let root = path.parent().unwrap_or(Path::new(".")).to_path_buf();
            (root, path.to_path_buf())
        } else {
            (path.to_path_buf(), path.join(EXPORT_FILE))
        };

        let bytes = tokio::fs::read(&file)
            .await
            .map_err(|e| Error::Source(format!("cannot read {}: {e}", file.display())))?;
        let source = Self::from_json(root, &bytes)?;

        tracing::debug!(
            export = %file.display(),
            messages = source.messages.len(),
            "Loaded channel export"
        );
        Ok(source)
    }

    /// Parse export JSON; media paths resolve against `root`
    pub fn from_json(root: impl Into<PathBuf>, json: &[u8]) -> Result<Self> {
        let export: ExportFile = serde_json::from_slice(json)
            .map_err(|e| Error::Source(format!("invalid channel export: {e}")))?;

        let mut messages: Vec<Message> = export.messages.into_iter().map(Message::from).collect();
        // Exports are written oldest first; keep that invariant even for hand-edited files
        messages.sort_by_key(|m| m.id);

        let info = ChannelInfo {
            id: export.id.unwrap_or_default(),
            title: export.name.unwrap_or_else(|| "Unnamed channel".to_string()),
            last_message_at: messages.iter().filter_map(|m| m.date).max(),
        };

        Ok(Self {
            root: root.into(),
            info,
            messages,
        })
    }

    /// Number of messages in the export
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the export holds no messages
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn resolve(&self, relative: &Path) -> std::result::Result<PathBuf, TransferError> {
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(TransferError::protocol(format!(
                "media path {} leaves the export directory",
                relative.display()
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl MessageSource for ExportSource {
    async fn channel_info(&self) -> Result<ChannelInfo> {
        Ok(self.info.clone())
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
impl MediaTransfer for ExportSource {
    async fn transfer(
        &self,
        attachment: &Attachment,
        destination: &mut (dyn AsyncWrite + Send + Unpin),
        track: &dyn DownloadTrack,
    ) -> std::result::Result<u64, TransferError> {
        let relative = match attachment.media() {
            Some(MediaRef::Path(path)) => path,
            Some(MediaRef::Unavailable(reason)) => {
                return Err(TransferError::not_found(reason.clone()));
            }
            None => return Err(TransferError::protocol("attachment has no downloadable media")),
        };

        let mut input = tokio::fs::File::open(self.resolve(relative)?).await?;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;

        loop {
            let n = input.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            destination.write_all(&buffer[..n]).await?;
            written += n as u64;
            track.update(n as u64);
        }
        destination.flush().await?;

        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// Export file format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ExportFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    messages: Vec<ExportMessage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExportMessage {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    date: Option<String>,
    date_unixtime: Option<String>,
    photo: Option<String>,
    photo_file_size: Option<u64>,
    file: Option<String>,
    file_name: Option<String>,
    file_size: Option<u64>,
    mime_type: Option<String>,
    media_type: Option<String>,
    duration_seconds: Option<u32>,
    title: Option<String>,
    location_information: Option<serde_json::Value>,
    poll: Option<serde_json::Value>,
    contact_information: Option<serde_json::Value>,
}

impl ExportMessage {
    fn date(&self) -> Option<DateTime<Utc>> {
        if let Some(ts) = self.date_unixtime.as_deref().and_then(|s| s.parse::<i64>().ok()) {
            return DateTime::from_timestamp(ts, 0);
        }
        let date = self.date.as_deref()?;
        NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    }

    fn attachment(&self) -> Option<Attachment> {
        if self.kind == "service" {
            return None;
        }
        if let Some(photo) = &self.photo {
            return Some(Attachment::Photo {
                size: self.photo_file_size,
                media: media_ref(photo),
            });
        }
        if let Some(file) = &self.file {
            return Some(Attachment::Document {
                attributes: self.document_attributes(),
                mime_type: self.mime_type.clone(),
                size: self.file_size,
                media: media_ref(file),
            });
        }
        let unsupported = [
            ("location", self.location_information.is_some()),
            ("poll", self.poll.is_some()),
            ("contact", self.contact_information.is_some()),
        ];
        unsupported
            .into_iter()
            .find(|(_, present)| *present)
            .map(|(kind, _)| Attachment::Unsupported {
                kind: kind.to_string(),
            })
    }

    fn document_attributes(&self) -> Vec<DocumentAttribute> {
        let mut attributes = Vec::new();
        if let Some(file_name) = &self.file_name {
            attributes.push(DocumentAttribute::Filename {
                file_name: file_name.clone(),
            });
        }
        match self.media_type.as_deref() {
            Some("audio_file" | "voice_message") => attributes.push(DocumentAttribute::Audio {
                duration: self.duration_seconds,
                title: self.title.clone(),
            }),
            Some("video_file" | "video_message" | "animation") => {
                attributes.push(DocumentAttribute::Video {
                    duration: self.duration_seconds,
                })
            }
            Some("sticker") => attributes.push(DocumentAttribute::Sticker),
            _ => {}
        }
        attributes
    }
}

impl From<ExportMessage> for Message {
    fn from(raw: ExportMessage) -> Self {
        Message {
            id: MessageId(raw.id),
            date: raw.date(),
            attachment: raw.attachment(),
        }
    }
}

/// Media excluded from an export is recorded as a parenthesised notice instead of a path
fn media_ref(value: &str) -> MediaRef {
    if value.starts_with('(') {
        MediaRef::Unavailable(value.trim_matches(['(', ')']).to_string())
    } else {
        MediaRef::Path(PathBuf::from(value))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransferErrorKind;
    use crate::progress::NoProgress;
    use crate::progress::ProgressReporter;

    const EXPORT: &str = r#"{
        "name": "Music Channel",
        "type": "public_channel",
        "id": 1001,
        "messages": [
            {"id": 1, "type": "service", "date": "2024-01-01T10:00:00", "action": "create_channel"},
            {"id": 2, "type": "message", "date": "2024-01-02T10:00:00", "date_unixtime": "1704189600",
             "file": "files/song.mp3", "file_name": "song.mp3", "file_size": 5,
             "media_type": "audio_file", "mime_type": "audio/mpeg", "duration_seconds": 3, "text": ""},
            {"id": 3, "type": "message", "date": "2024-01-03T10:00:00",
             "photo": "photos/photo_1@03-01-2024.jpg", "photo_file_size": 4, "width": 1, "height": 1},
            {"id": 4, "type": "message", "date": "2024-01-04T10:00:00",
             "file": "(File not included. Change data exporting settings to download.)",
             "file_name": "big.flac", "mime_type": "audio/flac"},
            {"id": 5, "type": "message", "date": "2024-01-05T10:00:00",
             "poll": {"question": "?", "answers": []}},
            {"id": 6, "type": "message", "date": "2024-01-06T10:00:00", "text": "hello"}
        ]
    }"#;

    async fn collect(source: &ExportSource, limit: Option<usize>, order: Order) -> Vec<i64> {
        source
            .messages(limit, order)
            .map(|m| m.id.get())
            .collect()
            .await
    }

    #[tokio::test]
    async fn channel_info_from_export() {
        let source = ExportSource::from_json("/tmp/export", EXPORT.as_bytes()).unwrap();
        let info = source.channel_info().await.unwrap();
        assert_eq!(info.id, 1001);
        assert_eq!(info.title, "Music Channel");
        assert_eq!(
            info.last_message_at.map(|d| d.to_rfc3339()),
            Some("2024-01-06T10:00:00+00:00".to_string())
        );
        assert_eq!(source.len(), 6);
    }

    #[tokio::test]
    async fn order_and_limit() {
        let source = ExportSource::from_json("/tmp/export", EXPORT.as_bytes()).unwrap();
        assert_eq!(
            collect(&source, None, Order::OldestFirst).await,
            vec![1, 2, 3, 4, 5, 6]
        );
        assert_eq!(
            collect(&source, Some(2), Order::NewestFirst).await,
            vec![6, 5]
        );
        assert_eq!(
            collect(&source, Some(2), Order::OldestFirst).await,
            vec![1, 2]
        );
        assert!(collect(&source, Some(0), Order::NewestFirst).await.is_empty());
    }

    #[test]
    fn maps_media_onto_attachments() {
        let source = ExportSource::from_json("/tmp/export", EXPORT.as_bytes()).unwrap();
        let by_id = |id: i64| {
            source
                .messages
                .iter()
                .find(|m| m.id.get() == id)
                .cloned()
                .unwrap()
        };

        assert_eq!(by_id(1).attachment, None, "service message");
        assert_eq!(by_id(6).attachment, None, "text message");

        match by_id(2).attachment.unwrap() {
            Attachment::Document {
                attributes,
                mime_type,
                size,
                media,
            } => {
                assert_eq!(
                    attributes[0],
                    DocumentAttribute::Filename {
                        file_name: "song.mp3".to_string()
                    }
                );
                assert!(matches!(attributes[1], DocumentAttribute::Audio { .. }));
                assert_eq!(mime_type.as_deref(), Some("audio/mpeg"));
                assert_eq!(size, Some(5));
                assert_eq!(media, MediaRef::Path("files/song.mp3".into()));
            }
            other => panic!("expected document, got {other:?}"),
        }

        assert!(matches!(
            by_id(3).attachment,
            Some(Attachment::Photo { size: Some(4), .. })
        ));
        assert!(matches!(
            by_id(4).attachment.unwrap().media(),
            Some(MediaRef::Unavailable(_))
        ));
        assert_eq!(
            by_id(5).attachment,
            Some(Attachment::Unsupported {
                kind: "poll".to_string()
            })
        );
    }

    #[test]
    fn invalid_json_is_a_source_error() {
        let err = ExportSource::from_json("/tmp", b"{ not json").unwrap_err();
        assert!(matches!(err, Error::Source(_)));
    }

    #[tokio::test]
    async fn open_missing_export_is_a_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ExportSource::open(dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::Source(_)));
    }

    #[tokio::test]
    async fn transfers_media_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("files")).unwrap();
        std::fs::write(dir.path().join("files/song.mp3"), b"ID3xx").unwrap();
        std::fs::write(dir.path().join(EXPORT_FILE), EXPORT).unwrap();

        let source = ExportSource::open(dir.path()).await.unwrap();
        let message = source.messages.iter().find(|m| m.id.get() == 2).unwrap();
        let track = NoProgress.begin_download("song.mp3", Some(5));

        let mut out: Vec<u8> = Vec::new();
        let written = source
            .transfer(message.attachment.as_ref().unwrap(), &mut out, track.as_ref())
            .await
            .unwrap();

        assert_eq!(written, 5);
        assert_eq!(out, b"ID3xx");
    }

    #[tokio::test]
    async fn missing_or_excluded_media_fails_with_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = ExportSource::from_json(dir.path(), EXPORT.as_bytes()).unwrap();
        let track = NoProgress.begin_download("x", None);
        let mut out: Vec<u8> = Vec::new();

        for id in [3, 4] {
            let message = source.messages.iter().find(|m| m.id.get() == id).unwrap();
            let err = source
                .transfer(message.attachment.as_ref().unwrap(), &mut out, track.as_ref())
                .await
                .unwrap_err();
            assert_eq!(err.kind, TransferErrorKind::NotFound, "message {id}");
        }
    }

    #[tokio::test]
    async fn media_paths_cannot_escape_the_export() {
        let source = ExportSource::from_json("/tmp/export", br#"{"messages": []}"#).unwrap();
        let attachment = Attachment::Photo {
            size: None,
            media: MediaRef::Path("../../etc/passwd".into()),
        };
        let track = NoProgress.begin_download("x", None);
        let mut out: Vec<u8> = Vec::new();

        let err = source
            .transfer(&attachment, &mut out, track.as_ref())
            .await
            .unwrap_err();
        assert_eq!(err.kind, TransferErrorKind::Protocol);
    }
}
