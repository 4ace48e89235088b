//! Per-URL extraction cache.
//!
//! One pretty-printed JSON file per talk page under the cache directory:
//!
//! ```json
//! {
//!   "slides":          { "1": ["slide text", "<png b64>"] },
//!   "summaries":       { "segment-1:9f2c…": "…", "3:41ab…": "…" },
//!   "classifications": { "1": { "unique_graphic": false, "cover": true } }
//! }
//! ```
//!
//! The entry only grows during a run. Every update rewrites the whole file
//! via temp file + rename so an interrupted run never leaves half a JSON
//! document behind. Updates are serialised through one async mutex, so the
//! concurrent summary workers never race on the file.
//!
//! A write failure is logged once and the cache keeps working in memory for
//! the rest of the run.

use crate::error::DigestError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Cached classification answers for one slide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideClassification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_graphic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<bool>,
}

/// The persisted document for one source URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Slide index → (raw text, encoded thumbnail).
    #[serde(default)]
    pub slides: BTreeMap<String, (String, String)>,
    /// Summary key → summary text.
    #[serde(default)]
    pub summaries: BTreeMap<String, String>,
    #[serde(default)]
    pub classifications: BTreeMap<String, SlideClassification>,
}

/// Replace every run of non-alphanumeric characters with `_`.
pub fn sanitize(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    let mut in_run = false;
    for c in url.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// `<dir>/<sanitized url>.json`
pub fn cache_path(dir: &Path, url: &str) -> PathBuf {
    dir.join(format!("{}.json", sanitize(url)))
}

/// Single-writer handle on one URL's cache entry.
pub struct ExtractionCache {
    path: PathBuf,
    entry: Mutex<CacheEntry>,
    memory_only: AtomicBool,
}

impl ExtractionCache {
    /// Load the entry for `url`, or start empty.
    ///
    /// A missing file is normal. An unreadable or corrupt file is logged and
    /// ignored; it is overwritten by the first update.
    pub async fn load(dir: &Path, url: &str) -> Self {
        let path = cache_path(dir, url);
        let mut memory_only = false;
        if let Err(source) = tokio::fs::create_dir_all(dir).await {
            let err = DigestError::CacheIo {
                path: dir.to_path_buf(),
                source,
            };
            warn!("{}; caching in memory only", err);
            memory_only = true;
        }

        let entry = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<CacheEntry>(&bytes) {
                Ok(entry) => {
                    debug!(
                        "Loaded cache {}: {} slides, {} summaries",
                        path.display(),
                        entry.slides.len(),
                        entry.summaries.len()
                    );
                    entry
                }
                Err(e) => {
                    warn!("Ignoring corrupt cache file {}: {}", path.display(), e);
                    CacheEntry::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheEntry::default(),
            Err(e) => {
                warn!("Could not read cache file {}: {}", path.display(), e);
                CacheEntry::default()
            }
        };

        Self {
            path,
            entry: Mutex::new(entry),
            memory_only: AtomicBool::new(memory_only),
        }
    }

    /// An empty cache that never touches disk.
    pub fn in_memory(url: &str) -> Self {
        Self {
            path: PathBuf::from(format!("{}.json", sanitize(url))),
            entry: Mutex::new(CacheEntry::default()),
            memory_only: AtomicBool::new(true),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_memory_only(&self) -> bool {
        self.memory_only.load(Ordering::SeqCst)
    }

    pub async fn slide(&self, index: usize) -> Option<(String, String)> {
        self.entry.lock().await.slides.get(&index.to_string()).cloned()
    }

    pub async fn summary(&self, key: &str) -> Option<String> {
        self.entry.lock().await.summaries.get(key).cloned()
    }

    pub async fn classification(&self, index: usize) -> SlideClassification {
        self.entry
            .lock()
            .await
            .classifications
            .get(&index.to_string())
            .copied()
            .unwrap_or_default()
    }

    pub async fn record_slide(&self, index: usize, text: &str, image: &str) {
        let mut entry = self.entry.lock().await;
        entry
            .slides
            .insert(index.to_string(), (text.to_string(), image.to_string()));
        self.persist(&entry).await;
    }

    pub async fn record_unique_graphic(&self, index: usize, value: bool) {
        let mut entry = self.entry.lock().await;
        entry
            .classifications
            .entry(index.to_string())
            .or_default()
            .unique_graphic = Some(value);
        self.persist(&entry).await;
    }

    pub async fn record_cover(&self, index: usize, value: bool) {
        let mut entry = self.entry.lock().await;
        entry
            .classifications
            .entry(index.to_string())
            .or_default()
            .cover = Some(value);
        self.persist(&entry).await;
    }

    pub async fn record_summary(&self, key: &str, text: &str) {
        let mut entry = self.entry.lock().await;
        entry.summaries.insert(key.to_string(), text.to_string());
        self.persist(&entry).await;
    }

    /// Write the entry while the caller still holds the lock.
    async fn persist(&self, entry: &CacheEntry) {
        if self.is_memory_only() {
            return;
        }
        if let Err(source) = write_atomic(&self.path, entry).await {
            let err = DigestError::CacheIo {
                path: self.path.clone(),
                source,
            };
            warn!("{}; continuing in memory only", err);
            self.memory_only.store(true, Ordering::SeqCst);
        }
    }
}

async fn write_atomic(path: &Path, entry: &CacheEntry) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(entry).map_err(std::io::Error::other)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &json).await?;
    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_collapses_runs() {
        assert_eq!(
            sanitize("https://iclr.cc/virtual/2025/oral/31"),
            "https_iclr_cc_virtual_2025_oral_31"
        );
        assert_eq!(sanitize("a//--b"), "a_b");
        assert_eq!(sanitize("plain"), "plain");
    }

    #[test]
    fn legacy_file_without_classifications_loads() {
        let json = r#"{"slides": {"1": ["hello", "b64"]}, "summaries": {"1": "s"}}"#;
        let entry: CacheEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.slides["1"], ("hello".to_string(), "b64".to_string()));
        assert!(entry.classifications.is_empty());
    }

    #[tokio::test]
    async fn entries_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://example.org/talk/7";

        let cache = ExtractionCache::load(dir.path(), url).await;
        cache.record_slide(1, "Intro", "img1").await;
        cache.record_unique_graphic(1, true).await;
        cache.record_cover(1, false).await;
        cache.record_summary("segment-1", "A summary.").await;
        assert!(cache.path().exists());
        assert!(!cache.is_memory_only());

        let reloaded = ExtractionCache::load(dir.path(), url).await;
        assert_eq!(
            reloaded.slide(1).await,
            Some(("Intro".to_string(), "img1".to_string()))
        );
        assert_eq!(reloaded.summary("segment-1").await.as_deref(), Some("A summary."));
        assert_eq!(
            reloaded.classification(1).await,
            SlideClassification {
                unique_graphic: Some(true),
                cover: Some(false)
            }
        );
        assert_eq!(reloaded.slide(2).await, None);
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://example.org/broken";
        std::fs::write(cache_path(dir.path(), url), b"{not json").unwrap();

        let cache = ExtractionCache::load(dir.path(), url).await;
        assert_eq!(cache.slide(1).await, None);
        assert_eq!(cache.summary("1").await, None);
        cache.record_summary("1", "fresh").await;

        let reloaded = ExtractionCache::load(dir.path(), url).await;
        assert_eq!(reloaded.summary("1").await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn in_memory_cache_never_writes() {
        let cache = ExtractionCache::in_memory("https://example.org/x");
        cache.record_slide(1, "t", "i").await;
        assert!(cache.is_memory_only());
        assert!(!cache.path().exists());
        assert_eq!(cache.slide(1).await, Some(("t".into(), "i".into())));
    }
}
