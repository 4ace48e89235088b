//! Configuration types for a slide-digest run.
//!
//! All behaviour is controlled through [`DigestConfig`], built via its
//! [`DigestConfigBuilder`]. The same config is shared by every talk in a
//! batch and by the concurrent summary workers.

use crate::error::DigestError;
use crate::progress::ProgressCallback;
use crate::retry::RetryPolicy;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for digesting one or more talk pages.
///
/// # Example
/// ```rust
/// use slide_digest::{DigestConfig, SummaryMode, TextSource};
///
/// let config = DigestConfig::builder()
///     .mode(SummaryMode::Workshop)
///     .text_source(TextSource::Ocr)
///     .concurrency(5)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct DigestConfig {
    /// How slides are grouped into summaries. Default: [`SummaryMode::Workshop`].
    pub mode: SummaryMode,

    /// Where slide text comes from. Default: [`TextSource::Vision`].
    pub text_source: TextSource,

    /// Concurrent summarisation calls. Default: 5.
    ///
    /// Slide capture is always sequential (one browser); only the summary
    /// phase fans out.
    pub concurrency: usize,

    /// Directory holding one JSON cache file per source URL. Default: `.cache`.
    pub cache_dir: PathBuf,

    /// Flat file each completed talk is appended to. Default: none.
    pub summaries_file: Option<PathBuf>,

    /// Minimum accumulated text (in chars) a segment needs to be summarised.
    /// Segments with `len <= min_segment_chars` are skipped. Default: 200.
    pub min_segment_chars: usize,

    /// Images sent with a summary request. Default: 20.
    pub max_summary_images: usize,

    /// Slide count used when the player does not show one. Default: 25.
    pub fallback_slide_count: usize,

    /// Optional hard cap on slides per deck. Default: none.
    pub max_slides: Option<usize>,

    /// How long to wait for the player iframe. Default: 15 s.
    pub iframe_wait: Duration,

    /// Pause after loading the deck before reading the slide count. Default: 1 s.
    pub deck_settle: Duration,

    /// Pause after each "next slide" key press. Default: 1.1 s.
    pub slide_settle: Duration,

    /// Cover-slide question for workshop segmentation. Default: the
    /// ICLR title-slide prompt.
    pub cover_slide_prompt: String,

    /// Retry policy for every backend call.
    pub retry: RetryPolicy,

    /// LLM model identifier. If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "anthropic", "openai", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum generated tokens per call. Default: 500.
    pub max_tokens: usize,

    /// Per-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Progress events for the CLI. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            mode: SummaryMode::default(),
            text_source: TextSource::default(),
            concurrency: 5,
            cache_dir: PathBuf::from(".cache"),
            summaries_file: None,
            min_segment_chars: 200,
            max_summary_images: crate::prompts::MAX_SUMMARY_IMAGES,
            fallback_slide_count: 25,
            max_slides: None,
            iframe_wait: Duration::from_secs(15),
            deck_settle: Duration::from_secs(1),
            slide_settle: Duration::from_millis(1100),
            cover_slide_prompt: crate::prompts::DEFAULT_COVER_SLIDE_PROMPT.to_string(),
            retry: RetryPolicy::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 500,
            api_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DigestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestConfig")
            .field("mode", &self.mode)
            .field("text_source", &self.text_source)
            .field("concurrency", &self.concurrency)
            .field("cache_dir", &self.cache_dir)
            .field("summaries_file", &self.summaries_file)
            .field("min_segment_chars", &self.min_segment_chars)
            .field("max_summary_images", &self.max_summary_images)
            .field("max_slides", &self.max_slides)
            .field("retry", &self.retry)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn DigestProgressCallback>"),
            )
            .finish()
    }
}

impl DigestConfig {
    /// Create a new builder for `DigestConfig`.
    pub fn builder() -> DigestConfigBuilder {
        DigestConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`DigestConfig`].
#[derive(Debug)]
pub struct DigestConfigBuilder {
    config: DigestConfig,
}

impl DigestConfigBuilder {
    pub fn mode(mut self, mode: SummaryMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn text_source(mut self, source: TextSource) -> Self {
        self.config.text_source = source;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    pub fn summaries_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.summaries_file = Some(path.into());
        self
    }

    pub fn min_segment_chars(mut self, n: usize) -> Self {
        self.config.min_segment_chars = n;
        self
    }

    pub fn max_summary_images(mut self, n: usize) -> Self {
        self.config.max_summary_images = n;
        self
    }

    pub fn fallback_slide_count(mut self, n: usize) -> Self {
        self.config.fallback_slide_count = n;
        self
    }

    pub fn max_slides(mut self, n: usize) -> Self {
        self.config.max_slides = Some(n);
        self
    }

    pub fn iframe_wait(mut self, d: Duration) -> Self {
        self.config.iframe_wait = d;
        self
    }

    pub fn deck_settle(mut self, d: Duration) -> Self {
        self.config.deck_settle = d;
        self
    }

    pub fn slide_settle(mut self, d: Duration) -> Self {
        self.config.slide_settle = d;
        self
    }

    pub fn cover_slide_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.cover_slide_prompt = prompt.into();
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DigestConfig, DigestError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(DigestError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.fallback_slide_count == 0 {
            return Err(DigestError::InvalidConfig(
                "Fallback slide count must be ≥ 1".into(),
            ));
        }
        if c.max_slides == Some(0) {
            return Err(DigestError::InvalidConfig("Max slides must be ≥ 1".into()));
        }
        if c.retry.max_attempts == 0 {
            return Err(DigestError::InvalidConfig(
                "Retry policy needs at least one attempt".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the captured slides of one page are turned into summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SummaryMode {
    /// One talk per page; the whole deck is a single segment and no
    /// cover-slide questions are asked. Oral and invited talks.
    Talk {
        /// Ask the model to name the speaker and the talk title.
        include_attribution: bool,
    },
    /// Several talks back to back; split on conference cover slides and
    /// summarise each segment. (default)
    #[default]
    Workshop,
    /// One summary per slide, all dispatched concurrently.
    PerSlide,
}

impl SummaryMode {
    /// Label used in the summaries file ("Oral Talk 3 summary:").
    pub fn label(&self) -> &'static str {
        match self {
            SummaryMode::Talk {
                include_attribution: false,
            } => "Oral Talk",
            SummaryMode::Talk {
                include_attribution: true,
            } => "Invited Talk",
            SummaryMode::Workshop => "Workshop",
            SummaryMode::PerSlide => "Slideshow",
        }
    }
}

/// Where slide text comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextSource {
    /// Ask the vision model to transcribe the slide. (default)
    #[default]
    Vision,
    /// Run the local `tesseract` binary.
    Ocr,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_constants() {
        let c = DigestConfig::default();
        assert_eq!(c.concurrency, 5);
        assert_eq!(c.min_segment_chars, 200);
        assert_eq!(c.max_summary_images, 20);
        assert_eq!(c.fallback_slide_count, 25);
        assert_eq!(c.retry.max_attempts, 5);
        assert_eq!(c.mode, SummaryMode::Workshop);
    }

    #[test]
    fn builder_clamps_concurrency() {
        let c = DigestConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn builder_rejects_zero_max_slides() {
        let err = DigestConfig::builder().max_slides(0).build().unwrap_err();
        assert!(err.to_string().contains("Max slides"));
    }

    #[test]
    fn mode_labels() {
        assert_eq!(
            SummaryMode::Talk {
                include_attribution: true
            }
            .label(),
            "Invited Talk"
        );
        assert_eq!(SummaryMode::Workshop.label(), "Workshop");
    }
}
