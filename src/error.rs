//! Error types for channel-dl
//!
//! Two layers of failure exist:
//! - [`Error`] covers everything that can abort a run before the message stream starts
//!   (configuration, message source, output directory).
//! - [`TransferError`] describes a single failed transfer attempt. It is retried by the
//!   transfer executor and, once attempts are exhausted, recorded as a failed download.
//!   It never aborts the run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for channel-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for channel-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_attempts")
        key: Option<String>,
    },

    /// The message source could not be opened or read
    #[error("message source error: {0}")]
    Source(String),

    /// The output directory could not be created or is not writable
    #[error("cannot prepare output directory {path}: {source}")]
    OutputDir {
        /// The directory that was being created
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    /// A transfer failed outside the retry loop
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl Error {
    /// Shorthand for a [`Error::Config`] tied to a configuration key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Category of a failed transfer attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferErrorKind {
    /// Connection dropped, timed out or was refused
    Network,
    /// Access to the media or the destination was denied
    Permission,
    /// The remote side answered with something unexpected
    Protocol,
    /// The referenced media does not exist (or was not exported)
    NotFound,
    /// Local read/write failure
    Io,
}

impl std::fmt::Display for TransferErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransferErrorKind::Network => "network",
            TransferErrorKind::Permission => "permission",
            TransferErrorKind::Protocol => "protocol",
            TransferErrorKind::NotFound => "not_found",
            TransferErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

/// A single failed transfer attempt, carrying its category and a description
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind} error: {detail}")]
pub struct TransferError {
    /// Error category
    pub kind: TransferErrorKind,
    /// Human-readable description of the underlying failure
    pub detail: String,
}

impl TransferError {
    /// Create a new transfer error
    pub fn new(kind: TransferErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Network-category error
    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::Network, detail)
    }

    /// Protocol-category error
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::Protocol, detail)
    }

    /// NotFound-category error
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::NotFound, detail)
    }
}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let kind = match e.kind() {
            ErrorKind::PermissionDenied => TransferErrorKind::Permission,
            ErrorKind::NotFound => TransferErrorKind::NotFound,
            ErrorKind::TimedOut
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => TransferErrorKind::Network,
            ErrorKind::InvalidData => TransferErrorKind::Protocol,
            _ => TransferErrorKind::Io,
        };
        Self::new(kind, e.to_string())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn io_errors_map_onto_transfer_categories() {
        let cases = [
            (ErrorKind::PermissionDenied, TransferErrorKind::Permission),
            (ErrorKind::NotFound, TransferErrorKind::NotFound),
            (ErrorKind::ConnectionReset, TransferErrorKind::Network),
            (ErrorKind::TimedOut, TransferErrorKind::Network),
            (ErrorKind::InvalidData, TransferErrorKind::Protocol),
            (ErrorKind::WriteZero, TransferErrorKind::Io),
        ];

        for (io_kind, expected) in cases {
            let err: TransferError = std::io::Error::new(io_kind, "boom").into();
            assert_eq!(err.kind, expected, "{io_kind:?} should map to {expected}");
            assert_eq!(err.detail, "boom");
        }
    }

    #[test]
    fn transfer_error_display_includes_category_and_detail() {
        let err = TransferError::network("connection reset by peer");
        assert_eq!(err.to_string(), "network error: connection reset by peer");
    }

    #[test]
    fn config_helper_records_key() {
        match Error::config("concurrency", "must be at least 1") {
            Error::Config { message, key } => {
                assert_eq!(message, "must be at least 1");
                assert_eq!(key.as_deref(), Some("concurrency"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn transfer_error_converts_into_crate_error() {
        let err: Error = TransferError::not_found("photo missing").into();
        assert_eq!(err.to_string(), "not_found error: photo missing");
    }
}
