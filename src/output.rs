//! Result types produced by the pipeline.

use crate::error::UnitError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One captured slide. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideRecord {
    /// 1-indexed position in the deck.
    pub index: usize,
    /// Text read from the slide; empty when extraction failed.
    pub raw_text: String,
    /// 320×180 PNG thumbnail, base64.
    pub encoded_image: String,
    /// The slide's graphic carries information its text does not.
    pub has_unique_graphic: bool,
}

/// A loaded slide player. Lives for one traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckSession {
    pub source_url: String,
    pub iframe_url: String,
    /// Always ≥ 1.
    pub total_slides: usize,
}

/// Slides judged to belong to one logical presentation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// 1-indexed position among the page's segments.
    pub number: usize,
    /// Indices of the member slides, in order.
    pub slides: Vec<usize>,
    /// Concatenated slide text.
    pub text: String,
    /// Slide index → image, for slides flagged `has_unique_graphic`.
    pub graphics: BTreeMap<usize, String>,
}

impl Segment {
    /// Text length in characters (the summarisation threshold counts chars).
    pub fn text_chars(&self) -> usize {
        self.text.chars().count()
    }

    /// Flagged images in slide order.
    pub fn graphic_images(&self) -> Vec<String> {
        self.graphics.values().cloned().collect()
    }
}

/// What a summary describes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SummaryId {
    Segment(usize),
    Slide(usize),
}

impl SummaryId {
    /// Short name used in logs, progress events and [`crate::UnitError::Summary`].
    pub fn label(&self) -> String {
        match self {
            SummaryId::Segment(n) => format!("segment-{n}"),
            SummaryId::Slide(n) => n.to_string(),
        }
    }
}

/// One generated summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub id: SummaryId,
    pub text: String,
}

/// Counters for one talk run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestStats {
    pub slides_captured: usize,
    pub slides_from_cache: usize,
    pub segments: usize,
    pub summaries: usize,
    pub failed_units: usize,
    pub traversal_ms: u64,
    pub summary_ms: u64,
}

/// Everything produced for one talk page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TalkDigest {
    pub source_url: String,
    pub deck: DeckSession,
    /// Summaries in segment / slide order.
    pub summaries: Vec<SummaryResult>,
    /// Segments too short to summarise.
    pub skipped_segments: Vec<usize>,
    pub failed_units: Vec<UnitError>,
    pub stats: DigestStats,
}

impl TalkDigest {
    /// Human-readable text for stdout and the summaries file.
    pub fn render(&self) -> String {
        match self.summaries.as_slice() {
            [] => String::new(),
            [only] if matches!(only.id, SummaryId::Segment(1)) => only.text.clone(),
            many => many
                .iter()
                .map(|s| match s.id {
                    SummaryId::Segment(n) => format!("Summary of slideshow {n}:\n{}", s.text),
                    SummaryId::Slide(n) => format!("Slide {n}:\n{}", s.text),
                })
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}
