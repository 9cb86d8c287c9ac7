//! Progress reporting
//!
//! The pipeline drives two kinds of tracks through [`ProgressReporter`]:
//! - one overall track counting processed messages,
//! - a transient download track per in-flight transfer, counting bytes.
//!
//! Reporters are passive: they only render what they are told and never block
//! the pipeline. A [`DownloadTrack`] is removed from the display when it is dropped,
//! so a track cannot outlive the transfer that created it.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::Write;
use std::time::Duration;

/// Receiver of progress updates from the pipeline and the transfer executor
pub trait ProgressReporter: Send + Sync {
    /// Initialise the overall track with the expected message count, if known
    fn start(&self, total_messages: Option<u64>);

    /// One message has been fully processed
    fn advance(&self);

    /// The stream is exhausted; label the overall track
    fn finish(&self, message: &str);

    /// Create a download track for a transfer that is about to begin
    fn begin_download(&self, filename: &str, total_bytes: Option<u64>) -> Box<dyn DownloadTrack>;

    /// Print a line without disturbing the tracks
    fn note(&self, line: &str);
}

/// Byte progress of a single transfer; dropped when the transfer concludes
pub trait DownloadTrack: Send + Sync {
    /// `bytes` more bytes were written
    fn update(&self, bytes: u64);

    /// A new attempt starts from zero
    fn restart(&self);
}

/// Reporter that renders nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start(&self, _total_messages: Option<u64>) {}

    fn advance(&self) {}

    fn finish(&self, _message: &str) {}

    fn begin_download(&self, _filename: &str, _total_bytes: Option<u64>) -> Box<dyn DownloadTrack> {
        Box::new(NoTrack)
    }

    fn note(&self, _line: &str) {}
}

struct NoTrack;

impl DownloadTrack for NoTrack {
    fn update(&self, _bytes: u64) {}

    fn restart(&self) {}
}

const OVERALL_TEMPLATE: &str =
    "{msg} [{bar:40.cyan/blue}] {percent:>3}% {pos}/{len} [{elapsed_precise} < {eta_precise}]";
const OVERALL_UNBOUNDED_TEMPLATE: &str = "{spinner:.green} {msg} {pos} messages [{elapsed_precise}]";
const DOWNLOAD_TEMPLATE: &str = "{msg:.bold.blue} [{bar:40.green/white}] {percent:>3}% {bytes}/{total_bytes} {bytes_per_sec} [{elapsed_precise} < {eta_precise}]";
const DOWNLOAD_UNBOUNDED_TEMPLATE: &str =
    "{spinner:.green} {msg:.bold.blue} {bytes} {bytes_per_sec} [{elapsed_precise}]";

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Terminal reporter backed by indicatif, drawing on stderr
#[derive(Clone)]
pub struct TerminalProgress {
    multi: MultiProgress,
    overall: ProgressBar,
}

impl TerminalProgress {
    /// Create a reporter drawing on stderr
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// Create a reporter that keeps state but draws nowhere
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let overall = multi.add(ProgressBar::no_length());
        Self { multi, overall }
    }

    /// Writer for log output that suspends the bars while a line is written
    pub fn log_writer(&self) -> LogWriter {
        LogWriter {
            multi: self.multi.clone(),
        }
    }

    /// Messages counted on the overall track so far
    pub fn position(&self) -> u64 {
        self.overall.position()
    }
    fn download_track(&self, filename: &str, total_bytes: Option<u64>) -> TerminalTrack {
        let bar = match total_bytes {
            Some(total) => ProgressBar::new(total).with_style(style(DOWNLOAD_TEMPLATE)),
            None => ProgressBar::no_length().with_style(style(DOWNLOAD_UNBOUNDED_TEMPLATE)),
        };
        let bar = self.multi.add(bar.with_message(format!("Downloading {filename}")));
        TerminalTrack {
            multi: self.multi.clone(),
            bar,
        }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for TerminalProgress {
    fn start(&self, total_messages: Option<u64>) {
        match total_messages {
            Some(total) => {
                self.overall.set_length(total);
                self.overall.set_style(style(OVERALL_TEMPLATE));
            }
            None => {
                self.overall.unset_length();
                self.overall.set_style(style(OVERALL_UNBOUNDED_TEMPLATE));
                self.overall.enable_steady_tick(Duration::from_millis(120));
            }
        }
        self.overall.set_message("Processing messages");
        self.overall.reset_elapsed();
    }

    fn advance(&self) {
        self.overall.inc(1);
    }

    fn finish(&self, message: &str) {
        // The configured total is an upper bound; a shorter history completes the bar.
        let position = self.overall.position();
        if self.overall.length().is_some_and(|len| len > position) {
            self.overall.set_length(position);
        }
        self.overall.finish_with_message(message.to_string());
    }

    fn begin_download(&self, filename: &str, total_bytes: Option<u64>) -> Box<dyn DownloadTrack> {
        Box::new(self.download_track(filename, total_bytes))
    }

    fn note(&self, line: &str) {
        if self.multi.println(line).is_err() {
            eprintln!("{line}");
        }
    }
}

struct TerminalTrack {
    multi: MultiProgress,
    bar: ProgressBar,
}

impl DownloadTrack for TerminalTrack {
    fn update(&self, bytes: u64) {
        self.bar.inc(bytes);
    }

    fn restart(&self) {
        self.bar.set_position(0);
        self.bar.reset_eta();
    }
}

impl Drop for TerminalTrack {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
        self.multi.remove(&self.bar);
    }
}

/// `io::Write` adapter for log output, see [`TerminalProgress::log_writer`]
pub struct LogWriter {
    multi: MultiProgress,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.multi
            .suspend(|| std::io::stderr().write_all(buf))
            .map(|()| buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()
    }
}
