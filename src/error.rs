//! Error types for the slide-digest library.
//!
//! Three layers of failure, each with its own type:
//!
//! * [`DigestError`]: **Fatal to one talk**: the deck could not be found,
//!   the browser stopped answering, or the provider is not configured.
//!   Returned as `Err(DigestError)` from [`crate::digest::Pipeline::run_talk`];
//!   the batch runner logs it against the URL and moves on.
//!
//! * [`UnitError`]: **Non-fatal**: one slide's text, one classification or
//!   one summary could not be produced. Stored in
//!   [`crate::output::TalkDigest::failed_units`] so the rest of the talk still
//!   gets summarised.
//!
//! * [`BackendError`] / [`BrowserError`]: raised by the two collaborator
//!   capabilities. A rate-limited backend call is the only error that is
//!   retried.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort the current talk. The batch continues with the next URL.
#[derive(Debug, Error)]
pub enum DigestError {
    // ── Discovery ─────────────────────────────────────────────────────────
    /// The slide-player iframe was not located within the wait window.
    #[error("No slide player found on '{url}': {reason}")]
    Discovery { url: String, reason: String },

    // ── Browser ───────────────────────────────────────────────────────────
    /// The browser session failed outside of slide navigation
    /// (page load timeout, screenshot failure, dead driver).
    #[error("Browser session failed: {0}")]
    Browser(#[from] BrowserError),

    // ── Cache ─────────────────────────────────────────────────────────────
    /// A cache file or directory could not be written. The cache degrades
    /// to memory-only; this is logged, never returned from a talk.
    #[error("Cache path '{path}' is not writable: {source}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── LLM ───────────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Output ────────────────────────────────────────────────────────────
    /// Could not append to the summaries file.
    #[error("Failed to write summaries file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config ────────────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures reported by a [`crate::browser::BrowserSession`].
#[derive(Debug, Error)]
pub enum BrowserError {
    /// No element with the given tag appeared before the wait expired.
    #[error("No <{tag}> element appeared within {waited_secs}s")]
    ElementNotFound { tag: String, waited_secs: u64 },

    /// The WebDriver endpoint answered with an error object.
    #[error("WebDriver error '{error}': {message}")]
    WebDriver { error: String, message: String },

    /// The HTTP round-trip to the driver failed.
    #[error("WebDriver transport error: {0}")]
    Transport(String),

    /// The driver answered with something that is not a valid payload.
    #[error("Unexpected WebDriver response: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for BrowserError {
    fn from(e: reqwest::Error) -> Self {
        BrowserError::Transport(e.to_string())
    }
}

/// Failures reported by a [`crate::backend::SummarizerBackend`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// HTTP 429 / overloaded: retried with backoff.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Any other failure: not retried.
    #[error("backend failure: {0}")]
    Failed(String),
}

impl BackendError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, BackendError::RateLimited(_))
    }
}

/// A non-fatal error for one unit of work.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize, PartialEq)]
pub enum UnitError {
    /// Text could not be read from a slide; the slide keeps an empty text.
    #[error("Slide {slide}: text extraction failed: {detail}")]
    SlideText { slide: usize, detail: String },

    /// A yes/no classification could not be obtained; treated as "no".
    #[error("Slide {slide}: {question} classification failed after {attempts} attempts: {detail}")]
    Classification {
        slide: usize,
        question: String,
        attempts: u32,
        detail: String,
    },

    /// A summary call failed; the unit is reported without a summary.
    #[error("Summary '{key}' failed after {attempts} attempts: {detail}")]
    Summary {
        key: String,
        attempts: u32,
        detail: String,
    },
}
