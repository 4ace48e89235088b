//! Pipeline stages for turning a talk page into summaries.
//!
//! Each submodule implements exactly one step and is testable on its own
//! with a mock browser or backend.
//!
//! ## Data Flow
//!
//! ```text
//! navigator ──▶ extractor ──▶ segment ──▶ summarize
//! (browser)     (cache, OCR/VLM)  (covers)   (VLM, concurrent)
//! ```
//!
//! 1. [`navigator`]: find the player iframe, count slides, press "next"
//! 2. [`extractor`]: screenshot, [`preprocess`], [`recognize`] text, ask
//!    whether the graphic adds information; backed by [`cache`]
//! 3. [`segment`]: split the deck on conference cover slides
//! 4. [`summarize`]: plan summary units and run them with bounded
//!    parallelism
//!
//! The browser is driven strictly sequentially through steps 1 and 2; only
//! step 4 fans out.

pub mod cache;
pub mod extractor;
pub mod navigator;
pub mod preprocess;
pub mod recognize;
pub mod segment;
pub mod summarize;
