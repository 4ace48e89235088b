//! # slide-digest
//!
//! Walk conference talk pages in a browser, read every slide, and summarise
//! the deck with a Vision Language Model.
//!
//! ## Why this crate?
//!
//! Recorded talks on virtual-conference sites show their slides in an
//! embedded player with no downloadable deck. This crate drives a real
//! browser through the player one slide at a time, reads each slide (VLM
//! transcription or local Tesseract), and writes short prose summaries: one
//! per talk, one per talk inside a multi-talk workshop recording, or one per
//! slide.
//!
//! ## Pipeline Overview
//!
//! ```text
//! talk page URL
//!  │
//!  ├─ 1. Discover  find the player iframe, strip its chrome, count slides
//!  ├─ 2. Traverse  screenshot → text → thumbnail, one slide at a time
//!  │               (cached per URL; "→" key between slides)
//!  ├─ 3. Segment   split workshop decks on conference cover slides
//!  ├─ 4. Summarise concurrent VLM calls, 5 at a time, retry on 429
//!  └─ 5. Output    summaries to stdout and an append-only summaries file
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slide_digest::{BrowserSession, DigestConfig, LlmBackend, Pipeline, SummaryMode};
//! use slide_digest::browser::{WebDriverConfig, WebDriverSession};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // chromedriver --port=9515 must be running.
//!     let browser = Arc::new(WebDriverSession::open(&WebDriverConfig::default()).await?);
//!     let config = DigestConfig::builder()
//!         .mode(SummaryMode::Talk { include_attribution: false })
//!         .build()?;
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let backend = Arc::new(LlmBackend::from_config(&config)?);
//!
//!     let pipeline = Pipeline::new(browser.clone(), backend, config);
//!     let digest = pipeline.run_talk("https://iclr.cc/virtual/2025/oral/31").await;
//!     browser.close().await?;
//!     println!("{}", digest?.render());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `slidedigest` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod browser;
pub mod config;
pub mod digest;
pub mod error;
pub mod listing;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod retry;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{LlmBackend, SummarizerBackend};
pub use browser::BrowserSession;
pub use config::{DigestConfig, DigestConfigBuilder, SummaryMode, TextSource};
pub use digest::{BatchReport, Pipeline, RunState, TalkOutcome};
pub use error::{BackendError, BrowserError, DigestError, UnitError};
pub use output::{DeckSession, DigestStats, Segment, SlideRecord, SummaryId, SummaryResult, TalkDigest};
pub use progress::{DigestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use retry::RetryPolicy;
