//! Progress reporter that records what the pipeline told it

use channel_dl::{DownloadTrack, ProgressReporter};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct RecordingProgress {
    pub started: Mutex<Option<Option<u64>>>,
    pub advanced: AtomicU64,
    pub finished: Mutex<Option<String>>,
    pub tracks_opened: AtomicU64,
    pub active_tracks: Arc<AtomicI64>,
    pub bytes: Arc<AtomicU64>,
    pub notes: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn advanced(&self) -> u64 {
        self.advanced.load(Ordering::SeqCst)
    }

    pub fn active_tracks(&self) -> i64 {
        self.active_tracks.load(Ordering::SeqCst)
    }

    pub fn notes(&self) -> Vec<String> {
        self.notes.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn start(&self, total_messages: Option<u64>) {
        *self.started.lock().unwrap() = Some(total_messages);
    }

    fn advance(&self) {
        self.advanced.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self, message: &str) {
        *self.finished.lock().unwrap() = Some(message.to_string());
    }

    fn begin_download(&self, _filename: &str, _total_bytes: Option<u64>) -> Box<dyn DownloadTrack> {
        self.tracks_opened.fetch_add(1, Ordering::SeqCst);
        self.active_tracks.fetch_add(1, Ordering::SeqCst);
        Box::new(RecordingTrack {
            active: self.active_tracks.clone(),
            bytes: self.bytes.clone(),
        })
    }

    fn note(&self, line: &str) {
        self.notes.lock().unwrap().push(line.to_string());
    }
}

struct RecordingTrack {
    active: Arc<AtomicI64>,
    bytes: Arc<AtomicU64>,
}

impl DownloadTrack for RecordingTrack {
    fn update(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    fn restart(&self) {}
}

impl Drop for RecordingTrack {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
