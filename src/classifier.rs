//! Attachment classification
//!
//! Resolves a destination filename and a normalized extension for the media a
//! message carries. Resolution order is fixed: explicit filename attribute, then
//! the MIME type hint, then `unknown`. The MIME hint is only consulted when no
//! filename is declared; a declared name without a usable extension resolves to
//! `unknown`. The same message always resolves to the same filename, which is
//! what makes re-runs idempotent.

use crate::types::{Attachment, AttachmentDescriptor, Classification, DocumentAttribute, Message};

/// Extension used when no signal about the format exists
pub const UNKNOWN_EXTENSION: &str = "unknown";

/// Classify the attachment of a message
pub fn classify(message: &Message) -> Classification {
    let Some(attachment) = &message.attachment else {
        return Classification::NoAttachment;
    };

    match attachment {
        Attachment::Photo { .. } => synthesized(message, "jpg"),
        Attachment::Document {
            attributes,
            mime_type,
            ..
        } => match declared_filename(attributes) {
            Some(declared) => match sanitize_filename(declared) {
                Some(filename) => {
                    let extension =
                        extension_of(&filename).unwrap_or_else(|| UNKNOWN_EXTENSION.to_string());
                    Classification::Resolved(AttachmentDescriptor {
                        filename,
                        extension,
                    })
                }
                None => Classification::UnresolvableFilename,
            },
            None => synthesized(message, extension_from_mime(mime_type.as_deref())),
        },
        Attachment::Unsupported { .. } => Classification::UnresolvableFilename,
    }
}

/// `<message-id>.<extension>`
fn synthesized(message: &Message, extension: &str) -> Classification {
    Classification::Resolved(AttachmentDescriptor {
        filename: format!("{}.{}", message.id, extension),
        extension: extension.to_string(),
    })
}

fn declared_filename(attributes: &[DocumentAttribute]) -> Option<&str> {
    attributes.iter().find_map(|attr| match attr {
        DocumentAttribute::Filename { file_name } => Some(file_name.as_str()),
        _ => None,
    })
}

/// Map a MIME type hint onto a default extension
pub fn extension_from_mime(mime_type: Option<&str>) -> &'static str {
    let Some(mime) = mime_type else {
        return UNKNOWN_EXTENSION;
    };
    let top_level = mime
        .split('/')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match top_level.as_str() {
        "image" => "jpg",
        "audio" => "mp3",
        "video" => "mp4",
        _ => UNKNOWN_EXTENSION,
    }
}

/// Lowercased final dot-segment of a filename, without the dot
///
/// Dotfiles (`.bashrc`) and names ending in a dot have no extension.
pub fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Reduce a sender-declared filename to a single path component
///
/// Declared names come from remote senders; any directory part is dropped so a
/// name can never escape the output directory. Returns `None` when nothing
/// usable remains.
pub fn sanitize_filename(declared: &str) -> Option<String> {
    let name = declared
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = name
        .chars()
        .map(|c| if c.is_control() || c == ':' { '_' } else { c })
        .collect();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return None;
    }
    Some(cleaned)
}
