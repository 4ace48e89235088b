//! Talk and batch entry points.
//!
//! [`Pipeline::run_talk`] walks one page through
//! `LoadingPage → DeckDiscovered → Traversing → Segmenting → Summarizing →
//! Done`, dropping to `Aborted` on a fatal error. [`Pipeline::run_batch`]
//! runs talks one after another on the shared browser; one talk failing never
//! stops the batch.

use crate::backend::SummarizerBackend;
use crate::browser::BrowserSession;
use crate::config::{DigestConfig, SummaryMode};
use crate::error::DigestError;
use crate::output::{DigestStats, SlideRecord, TalkDigest};
use crate::pipeline::cache::ExtractionCache;
use crate::pipeline::extractor::SlideExtractor;
use crate::pipeline::navigator::{Advance, SlideNavigator};
use crate::pipeline::recognize::{recognizer_for, TextRecognizer};
use crate::pipeline::segment::{segment_deck, segment_with_flags, PromptCoverClassifier};
use crate::pipeline::summarize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

/// Where a talk run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    LoadingPage,
    DeckDiscovered,
    Traversing,
    Segmenting,
    Summarizing,
    Done,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::LoadingPage => "loading page",
            RunState::DeckDiscovered => "deck discovered",
            RunState::Traversing => "traversing",
            RunState::Segmenting => "segmenting",
            RunState::Summarizing => "summarizing",
            RunState::Done => "done",
            RunState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

struct RunTracker<'a> {
    url: &'a str,
    state: RunState,
}

impl<'a> RunTracker<'a> {
    fn new(url: &'a str) -> Self {
        Self {
            url,
            state: RunState::Idle,
        }
    }

    fn enter(&mut self, next: RunState) {
        info!("[{}] {} → {}", self.url, self.state, next);
        self.state = next;
    }
}

/// The result of one talk within a batch.
#[derive(Debug)]
pub struct TalkOutcome {
    /// 1-indexed position in the batch.
    pub number: usize,
    pub url: String,
    pub result: Result<TalkDigest, DigestError>,
}

/// Every talk of a batch, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub talks: Vec<TalkOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.talks.iter().filter(|t| t.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.talks.len() - self.succeeded()
    }

    /// Successful talks' summaries, one entry heading each.
    pub fn render(&self, mode: SummaryMode) -> String {
        self.talks
            .iter()
            .filter_map(|t| match &t.result {
                Ok(digest) => summary_entry(mode, t.number, &digest.render()),
                Err(_) => None,
            })
            .collect()
    }
}

/// `"\n<Label> N summary:\n<text>\n"`, or nothing for an empty text.
pub fn summary_entry(mode: SummaryMode, number: usize, text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    let noun = if mode == SummaryMode::Workshop {
        "summaries"
    } else {
        "summary"
    };
    Some(format!("\n{} {} {}:\n{}\n", mode.label(), number, noun, text))
}

/// Shared browser + backend + config; run talks through it.
pub struct Pipeline {
    browser: Arc<dyn BrowserSession>,
    backend: Arc<dyn SummarizerBackend>,
    recognizer: Box<dyn TextRecognizer>,
    config: DigestConfig,
}

impl Pipeline {
    pub fn new(
        browser: Arc<dyn BrowserSession>,
        backend: Arc<dyn SummarizerBackend>,
        config: DigestConfig,
    ) -> Self {
        let recognizer = recognizer_for(&config, Arc::clone(&backend));
        Self {
            browser,
            backend,
            recognizer,
            config,
        }
    }

    /// Replace the text recognizer picked from `config.text_source`.
    pub fn with_recognizer(mut self, recognizer: Box<dyn TextRecognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    pub fn config(&self) -> &DigestConfig {
        &self.config
    }

    /// Digest one talk page.
    ///
    /// # Errors
    /// Only fatal conditions: no slide player on the page, or the browser
    /// stopped answering. Per-slide and per-summary failures are collected in
    /// [`TalkDigest::failed_units`].
    pub async fn run_talk(&self, url: &str) -> Result<TalkDigest, DigestError> {
        let mut run = RunTracker::new(url);
        match self.run_talk_inner(url, &mut run).await {
            Ok(digest) => {
                run.enter(RunState::Done);
                Ok(digest)
            }
            Err(e) => {
                run.enter(RunState::Aborted);
                Err(e)
            }
        }
    }

    async fn run_talk_inner(&self, url: &str, run: &mut RunTracker<'_>) -> Result<TalkDigest, DigestError> {
        let config = &self.config;
        let mut stats = DigestStats::default();
        let mut failed_units = Vec::new();

        // ── Step 1: Load page, find the deck ─────────────────────────────────
        run.enter(RunState::LoadingPage);
        let cache = ExtractionCache::load(&config.cache_dir, url).await;
        let navigator = SlideNavigator::new(self.browser.as_ref(), config);
        let deck = navigator.discover_deck(url).await?;
        run.enter(RunState::DeckDiscovered);
        info!("Deck has {} slides ({})", deck.total_slides, deck.iframe_url);
        if let Some(ref cb) = config.progress_callback {
            cb.on_deck_discovered(url, deck.total_slides);
        }

        // ── Step 2: Walk the deck ────────────────────────────────────────────
        run.enter(RunState::Traversing);
        let traversal_start = Instant::now();
        let extractor = SlideExtractor {
            browser: self.browser.as_ref(),
            backend: self.backend.as_ref(),
            recognizer: self.recognizer.as_ref(),
            cache: &cache,
            retry: config.retry,
            classify_graphics: config.mode != SummaryMode::PerSlide,
        };
        let mut records: Vec<SlideRecord> = Vec::with_capacity(deck.total_slides);
        for index in 1..=deck.total_slides {
            let extraction = extractor.extract(&deck, index).await?;
            stats.slides_captured += 1;
            if extraction.from_cache {
                stats.slides_from_cache += 1;
            }
            if let Some(ref cb) = config.progress_callback {
                cb.on_slide_captured(index, deck.total_slides, extraction.from_cache);
            }
            failed_units.extend(extraction.errors);
            records.push(extraction.record);

            if index == deck.total_slides {
                break;
            }
            if navigator.advance().await == Advance::Boundary {
                warn!(
                    "Stopped after slide {} of {}: could not advance",
                    index, deck.total_slides
                );
                break;
            }
        }
        stats.traversal_ms = traversal_start.elapsed().as_millis() as u64;

        // ── Step 3: Segment ──────────────────────────────────────────────────
        run.enter(RunState::Segmenting);
        let segments = match config.mode {
            SummaryMode::Workshop => {
                let classifier = PromptCoverClassifier {
                    backend: self.backend.as_ref(),
                    cache: &cache,
                    prompt: &config.cover_slide_prompt,
                    retry: config.retry,
                };
                let (segments, errors) = segment_deck(&records, &classifier).await;
                failed_units.extend(errors);
                segments
            }
            SummaryMode::Talk { .. } => segment_with_flags(&records, &vec![false; records.len()]),
            SummaryMode::PerSlide => Vec::new(),
        };
        stats.segments = segments.len();

        // ── Step 4: Summarise ────────────────────────────────────────────────
        run.enter(RunState::Summarizing);
        let summary_start = Instant::now();
        let plan = summarize::plan(config.mode, &segments, &records, config);
        let (summaries, errors) =
            summarize::dispatch(plan.units, self.backend.as_ref(), &cache, config).await;
        failed_units.extend(errors);
        stats.summary_ms = summary_start.elapsed().as_millis() as u64;
        stats.summaries = summaries.len();
        stats.failed_units = failed_units.len();

        info!(
            "{}: {} slides ({} cached), {} segments, {} summaries, {} failed units",
            url,
            stats.slides_captured,
            stats.slides_from_cache,
            stats.segments,
            stats.summaries,
            stats.failed_units
        );

        Ok(TalkDigest {
            source_url: url.to_string(),
            deck,
            summaries,
            skipped_segments: plan.skipped_segments,
            failed_units,
            stats,
        })
    }

    /// Digest every URL in order on the shared browser.
    ///
    /// Failures are logged against their URL and the batch moves on. When a
    /// summaries file is configured each completed talk is appended to it.
    pub async fn run_batch(&self, urls: &[String]) -> BatchReport {
        let config = &self.config;
        if let Some(ref cb) = config.progress_callback {
            cb.on_batch_start(urls.len());
        }

        let mut report = BatchReport::default();
        for (i, url) in urls.iter().enumerate() {
            let number = i + 1;
            if let Some(ref cb) = config.progress_callback {
                cb.on_talk_start(number, url);
            }

            let result = self.run_talk(url).await;
            match &result {
                Ok(digest) => {
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_talk_complete(number, url, digest.summaries.len());
                    }
                    if let Some(ref path) = config.summaries_file {
                        if let Some(entry) = summary_entry(config.mode, number, &digest.render()) {
                            if let Err(e) = append_entry(path, &entry).await {
                                error!("{}", e);
                            }
                        }
                    }
                    info!("{} {} done.", config.mode.label(), number);
                }
                Err(e) => {
                    error!("Skipping {}: {}", url, e);
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_talk_error(number, url, &e.to_string());
                    }
                }
            }
            report.talks.push(TalkOutcome {
                number,
                url: url.clone(),
                result,
            });
        }

        if let Some(ref cb) = config.progress_callback {
            cb.on_batch_complete(urls.len(), report.succeeded());
        }
        report
    }
}

/// Append one entry to the summaries file, creating it if needed.
pub async fn append_entry(path: &Path, entry: &str) -> Result<(), DigestError> {
    let write_err = |source: std::io::Error| DigestError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(write_err)?;
    file.write_all(entry.as_bytes()).await.map_err(write_err)?;
    file.flush().await.map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_heading_follows_mode() {
        let oral = summary_entry(
            SummaryMode::Talk {
                include_attribution: false,
            },
            2,
            "Text.",
        );
        assert_eq!(oral.as_deref(), Some("\nOral Talk 2 summary:\nText.\n"));
        let ws = summary_entry(SummaryMode::Workshop, 1, "A");
        assert_eq!(ws.as_deref(), Some("\nWorkshop 1 summaries:\nA\n"));
        assert_eq!(summary_entry(SummaryMode::Workshop, 1, "  "), None);
    }

    #[test]
    fn state_names_are_readable() {
        assert_eq!(RunState::DeckDiscovered.to_string(), "deck discovered");
        assert_eq!(RunState::Aborted.to_string(), "aborted");
    }

    #[tokio::test]
    async fn entries_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("summaries.txt");
        append_entry(&path, "\nOne\n").await.unwrap();
        append_entry(&path, "\nTwo\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "\nOne\n\nTwo\n");
    }
}
