//! Deck segmentation on cover slides.
//!
//! A workshop recording plays several talks back to back, each opening with
//! the conference's branded title slide. Scanning the records in order, a
//! cover slide closes the open segment and starts a new one *before* its own
//! text is appended, so the cover belongs to the talk it introduces.
//!
//! With `K` cover slides the deck yields `K` segments when the first slide is
//! a cover and `K + 1` otherwise; with none, one segment spans the deck.

use crate::backend::{ask_yes_no, SummarizerBackend};
use crate::error::UnitError;
use crate::output::{Segment, SlideRecord};
use crate::pipeline::cache::ExtractionCache;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use tracing::{debug, info};

/// Decides whether a slide opens a new presentation.
#[async_trait]
pub trait CoverSlideClassifier: Send + Sync {
    async fn is_cover(&self, record: &SlideRecord) -> Result<bool, UnitError>;
}

/// Asks the vision model a yes/no cover-slide question about the thumbnail.
/// Answers are cached per slide.
pub struct PromptCoverClassifier<'a> {
    pub backend: &'a dyn SummarizerBackend,
    pub cache: &'a ExtractionCache,
    pub prompt: &'a str,
    pub retry: RetryPolicy,
}

#[async_trait]
impl CoverSlideClassifier for PromptCoverClassifier<'_> {
    async fn is_cover(&self, record: &SlideRecord) -> Result<bool, UnitError> {
        if let Some(cached) = self.cache.classification(record.index).await.cover {
            return Ok(cached);
        }
        if record.encoded_image.is_empty() {
            return Ok(false);
        }

        let context = format!("slide {} cover check", record.index);
        let attempted = ask_yes_no(
            self.backend,
            &self.retry,
            &record.encoded_image,
            self.prompt,
            &context,
        )
        .await;
        match attempted.outcome {
            Ok(answer) => {
                self.cache.record_cover(record.index, answer).await;
                Ok(answer)
            }
            Err(e) => Err(UnitError::Classification {
                slide: record.index,
                question: "cover slide".into(),
                attempts: attempted.attempts,
                detail: e.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmenterState {
    Idle,
    BoundaryDetected,
    Accumulating,
}

/// Incremental segment assembly. Closed segments are never touched again.
#[derive(Debug)]
pub struct SegmentBuilder {
    state: SegmenterState,
    closed: Vec<Segment>,
    open: Option<Segment>,
}

impl Default for SegmentBuilder {
    fn default() -> Self {
        Self {
            state: SegmenterState::Idle,
            closed: Vec::new(),
            open: None,
        }
    }
}

impl SegmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the next record. Order: boundary check, text, graphic.
    pub fn push(&mut self, record: &SlideRecord, is_cover: bool) {
        debug!("Segmenter {:?}: slide {}", self.state, record.index);
        if is_cover {
            if let Some(done) = self.open.take() {
                self.closed.push(done);
            }
            self.state = SegmenterState::BoundaryDetected;
            debug!("Slide {}: cover slide, starting a new segment", record.index);
        }

        let number = self.closed.len() + 1;
        let segment = self.open.get_or_insert_with(|| Segment {
            number,
            ..Default::default()
        });

        segment.slides.push(record.index);
        segment.text.push_str(&record.raw_text);
        if record.has_unique_graphic {
            segment
                .graphics
                .insert(record.index, record.encoded_image.clone());
        }
        self.state = SegmenterState::Accumulating;
    }

    pub fn finish(mut self) -> Vec<Segment> {
        if let Some(done) = self.open.take() {
            self.closed.push(done);
        }
        self.closed
    }
}

/// Segment `records` given precomputed cover flags (same length and order).
pub fn segment_with_flags(records: &[SlideRecord], covers: &[bool]) -> Vec<Segment> {
    let mut builder = SegmentBuilder::new();
    for (record, &is_cover) in records.iter().zip(covers) {
        builder.push(record, is_cover);
    }
    builder.finish()
}

/// Classify every record in order and split the deck.
///
/// A failed classification counts as "not a cover" and is reported.
pub async fn segment_deck(
    records: &[SlideRecord],
    classifier: &dyn CoverSlideClassifier,
) -> (Vec<Segment>, Vec<UnitError>) {
    let mut builder = SegmentBuilder::new();
    let mut errors = Vec::new();
    for record in records {
        let is_cover = match classifier.is_cover(record).await {
            Ok(answer) => answer,
            Err(e) => {
                errors.push(e);
                false
            }
        };
        builder.push(record, is_cover);
    }
    let segments = builder.finish();
    info!("Deck split into {} segment(s)", segments.len());
    (segments, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(index: usize, text: &str, graphic: bool) -> SlideRecord {
        SlideRecord {
            index,
            raw_text: text.to_string(),
            encoded_image: format!("img{index}"),
            has_unique_graphic: graphic,
        }
    }

    #[test]
    fn no_cover_gives_one_segment() {
        let records = vec![rec(1, "a", false), rec(2, "b", true), rec(3, "c", false)];
        let segs = segment_with_flags(&records, &[false, false, false]);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].slides, vec![1, 2, 3]);
        assert_eq!(segs[0].text, "abc");
        assert_eq!(segs[0].graphic_images(), vec!["img2".to_string()]);
    }

    #[test]
    fn cover_at_start_does_not_add_an_empty_segment() {
        let records = vec![rec(1, "cover", false), rec(2, "body", false)];
        let segs = segment_with_flags(&records, &[true, false]);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].slides, vec![1, 2]);
    }

    #[test]
    fn interior_covers_split_into_k_plus_one() {
        let records: Vec<_> = (1..=6).map(|i| rec(i, &format!("s{i}"), false)).collect();
        let segs = segment_with_flags(&records, &[false, false, true, false, true, false]);
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].slides, vec![1, 2]);
        assert_eq!(segs[1].slides, vec![3, 4]);
        assert_eq!(segs[2].slides, vec![5, 6]);
        assert_eq!(
            segs.iter().map(|s| s.number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn cover_slide_graphic_goes_to_the_new_segment() {
        let records = vec![rec(1, "a", false), rec(2, "cover", true)];
        let segs = segment_with_flags(&records, &[false, true]);
        assert!(segs[0].graphics.is_empty());
        assert_eq!(segs[1].graphics.get(&2).map(String::as_str), Some("img2"));
    }

    struct Scripted(Vec<Result<bool, UnitError>>);

    #[async_trait]
    impl CoverSlideClassifier for Scripted {
        async fn is_cover(&self, record: &SlideRecord) -> Result<bool, UnitError> {
            self.0[record.index - 1].clone()
        }
    }

    #[tokio::test]
    async fn failed_classification_counts_as_no() {
        let records = vec![rec(1, "a", false), rec(2, "b", false), rec(3, "c", false)];
        let classifier = Scripted(vec![
            Ok(false),
            Err(UnitError::Classification {
                slide: 2,
                question: "cover slide".into(),
                attempts: 5,
                detail: "rate limited".into(),
            }),
            Ok(true),
        ]);
        let (segs, errors) = segment_deck(&records, &classifier).await;
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].slides, vec![1, 2]);
        assert_eq!(errors.len(), 1);
    }
}
