//! Configuration types for channel-dl
//!
//! A [`Config`] is built once at startup (TOML file, then environment / CLI
//! overrides applied by the binary), validated, and then shared read-only with
//! every component for the duration of the run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Enumeration order of the channel history
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    /// Most recent message first (default)
    #[default]
    NewestFirst,
    /// Oldest message first
    OldestFirst,
}

/// Message source settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Channel identifier (for the export source: the export directory)
    #[serde(default)]
    pub channel: String,

    /// Maximum number of messages to enumerate (None = whole history)
    #[serde(default)]
    pub history_limit: Option<usize>,

    /// Enumeration order
    #[serde(default)]
    pub order: Order,
}

/// Format filter settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Extensions eligible for download when `download_all` is off (default: ["mp3"])
    #[serde(default = "default_allowed_formats")]
    pub allowed_formats: Vec<String>,

    /// Bypass the allow-list entirely
    #[serde(default)]
    pub download_all: bool,

    /// Capacity of the per-extension decision memo (default: 256)
    #[serde(default = "default_filter_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            allowed_formats: default_allowed_formats(),
            download_all: false,
            cache_capacity: default_filter_cache_capacity(),
        }
    }
}

/// Retry and backoff policy for the transfer executor
///
/// The defaults reproduce a fixed one-second pause between at most three attempts.
/// Setting `backoff_multiplier` above 1.0 turns the fixed pause into exponential
/// backoff capped at `max_delay`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Total number of attempts per file, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after every retry (default: 1.0, fixed delay)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,

    /// Retry errors that are unlikely to be transient, such as permission errors (default: true)
    #[serde(default = "default_true")]
    pub retry_permanent_errors: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
            retry_permanent_errors: true,
        }
    }
}

impl BackoffPolicy {
    /// Policy with the given attempt bound and no waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based), before jitter
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let cap = self.max_delay.max(self.initial_delay);
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        // Unvalidated policies may carry a multiplier below 1.0 or NaN; never shrink the delay
        let multiplier = self.backoff_multiplier.max(1.0);
        let secs = self.initial_delay.as_secs_f64() * multiplier.powi(exponent);
        if !secs.is_finite() || secs >= cap.as_secs_f64() {
            return cap;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Output and execution settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Destination root (default: "downloads/<channel>")
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Messages processed concurrently (default: 1, strictly sequential)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Report filtered and skipped files, not only downloads
    #[serde(default)]
    pub debug: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            concurrency: default_concurrency(),
            debug: false,
        }
    }
}

/// Main configuration
///
/// Sub-configs are flattened so the TOML file stays a flat list of keys,
/// except for the `[retry]` table.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Message source settings
    #[serde(flatten)]
    pub source: SourceConfig,

    /// Format filter settings
    #[serde(flatten)]
    pub filter: FilterConfig,

    /// Output and execution settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Retry policy
    #[serde(default)]
    pub retry: BackoffPolicy,
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check the configuration for values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.source.channel.trim().is_empty() {
            return Err(Error::config("channel", "a channel identifier is required"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config(
                "max_attempts",
                "at least one attempt is required",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "backoff_multiplier",
                "multiplier must be 1.0 or greater",
            ));
        }
        if self.download.concurrency == 0 {
            return Err(Error::config("concurrency", "must be at least 1"));
        }
        if !self.filter.download_all
            && self
                .filter
                .allowed_formats
                .iter()
                .all(|f| f.trim().trim_start_matches('.').is_empty())
        {
            return Err(Error::config(
                "allowed_formats",
                "allow-list is empty and download_all is off, nothing would be downloaded",
            ));
        }
        Ok(())
    }

    /// Destination root: the configured directory, or `downloads/<channel>`
    pub fn output_dir(&self) -> PathBuf {
        match &self.download.output_dir {
            Some(dir) => dir.clone(),
            None => Path::new("downloads").join(channel_slug(&self.source.channel)),
        }
    }
}

/// Reduce a channel identifier to a single safe directory name
///
/// `"@My Channel"` becomes `"My_Channel"`, `"exports/news/"` becomes `"news"`.
pub fn channel_slug(channel: &str) -> String {
    let last = channel
        .trim()
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim_start_matches('@');

    let slug: String = last
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if slug.is_empty() || slug.chars().all(|c| c == '.') {
        "channel".to_string()
    } else {
        slug
    }
}

fn default_allowed_formats() -> Vec<String> {
    vec!["mp3".to_string()]
}

fn default_filter_cache_capacity() -> usize {
    256
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_concurrency() -> usize {
    1
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
