//! Format filter
//!
//! Decides whether an attachment's extension is eligible for download. The
//! decision is a pure function of the extension and the filter configuration,
//! which is fixed for the run, so decisions are memoized per normalized
//! extension in a bounded LRU cache.

use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use crate::config::FilterConfig;

/// Allow-list filter with a bounded decision memo
pub struct FormatFilter {
    allowed: HashSet<String>,
    download_all: bool,
    cache: Mutex<LruCache<String, bool>>,
}

impl FormatFilter {
    /// Build a filter from configuration; the configuration is copied and never re-read
    pub fn new(config: &FilterConfig) -> Self {
        let allowed = config
            .allowed_formats
            .iter()
            .map(|f| normalize_extension(f))
            .filter(|f| !f.is_empty())
            .collect();
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            allowed,
            download_all: config.download_all,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Whether a file with this extension should be downloaded
    ///
    /// Accepts `"mp3"`, `".MP3"` and the like.
    pub fn should_download(&self, extension: &str) -> bool {
        if self.download_all {
            return true;
        }

        let key = normalize_extension(extension);
        // Entries are written whole; a poisoned memo is still consistent.
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(&decision) = cache.get(&key) {
            return decision;
        }
        let decision = self.allowed.contains(&key);
        cache.put(key, decision);
        decision
    }

    /// Whether the "download all" override is on
    pub fn download_all(&self) -> bool {
        self.download_all
    }

    /// Allowed extensions, sorted, for display
    pub fn allowed_formats(&self) -> Vec<&str> {
        let mut formats: Vec<&str> = self.allowed.iter().map(String::as_str).collect();
        formats.sort_unstable();
        formats
    }

    /// Human-readable summary: `all` under the override, otherwise the allow-list
    pub fn describe(&self) -> String {
        if self.download_all {
            "all".to_string()
        } else {
            self.allowed_formats().join(", ")
        }
    }

    #[cfg(test)]
    fn cached_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or_default()
    }
}

/// Strip surrounding whitespace and leading dots, then lowercase
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(formats: &[&str], download_all: bool) -> FormatFilter {
        FormatFilter::new(&FilterConfig {
            allowed_formats: formats.iter().map(|f| f.to_string()).collect(),
            download_all,
            cache_capacity: 4,
        })
    }

    #[test]
    fn allow_list_membership_is_case_and_dot_insensitive() {
        let f = filter(&["mp3", ".JPG"], false);
        assert!(f.should_download("mp3"));
        assert!(f.should_download(".MP3"));
        assert!(f.should_download("jpg"));
        assert!(f.should_download(" Jpg "));
        assert!(!f.should_download("txt"));
        assert!(!f.should_download("unknown"));
    }

    #[test]
    fn override_accepts_every_extension() {
        let f = filter(&[], true);
        for ext in ["mp3", "txt", "unknown", "", ".EXE", "tar.gz"] {
            assert!(f.should_download(ext), "{ext:?} must pass under the override");
        }
        assert_eq!(f.describe(), "all");
    }

    #[test]
    fn override_ignores_allow_list_contents() {
        let f = filter(&["mp3"], true);
        assert!(f.should_download("flac"));
    }

    #[test]
    fn repeated_lookups_give_the_same_answer() {
        let f = filter(&["mp3"], false);
        for _ in 0..3 {
            assert!(f.should_download("MP3"));
            assert!(!f.should_download("wav"));
        }
        assert_eq!(f.cached_len(), 2, "one memo entry per normalized extension");
    }

    #[test]
    fn memo_is_bounded() {
        let f = filter(&["mp3"], false);
        for ext in ["a", "b", "c", "d", "e", "f"] {
            f.should_download(ext);
        }
        assert_eq!(f.cached_len(), 4);
        assert!(f.should_download("mp3"));
    }

    #[test]
    fn describe_lists_sorted_formats() {
        let f = filter(&["mp3", "flac", "FLAC"], false);
        assert_eq!(f.describe(), "flac, mp3");
    }

    #[test]
    fn zero_capacity_still_works() {
        let f = FormatFilter::new(&FilterConfig {
            allowed_formats: vec!["mp3".to_string()],
            download_all: false,
            cache_capacity: 0,
        });
        assert!(f.should_download("mp3"));
        assert!(!f.should_download("ogg"));
    }

    #[test]
    fn normalize_strips_dots_and_case() {
        assert_eq!(normalize_extension("..Mp3"), "mp3");
        assert_eq!(normalize_extension(" JPG "), "jpg");
    }
}
