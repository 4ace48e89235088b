//! Summary planning and bounded-concurrency dispatch.
//!
//! Planning turns segments (or individual slides) into [`SummaryUnit`]s:
//! segments whose text is too short are skipped, images are capped, and the
//! prompt is fixed up front. Dispatch then runs the units through the backend
//! with at most `concurrency` calls in flight, reusing cached summaries and
//! recording new ones as they complete.
//!
//! A unit's cache key is its label plus a SHA-256 fingerprint of the prompt
//! and images. A summary is only reused for exactly the request that
//! produced it: a slide whose text was recovered on a later run, a moved
//! segment boundary or a different summary mode all miss the cache.

use crate::backend::SummarizerBackend;
use crate::config::{DigestConfig, SummaryMode};
use crate::error::UnitError;
use crate::output::{Segment, SlideRecord, SummaryId, SummaryResult};
use crate::pipeline::cache::ExtractionCache;
use crate::prompts::{slide_summary_prompt, summary_prompt, MAX_SUMMARY_IMAGES};
use crate::retry::{run_with_retry, Attempted, RetryPolicy};
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// One summary request, fully prepared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryUnit {
    pub id: SummaryId,
    /// `<label>:<fingerprint>`, see [`SummaryUnit::new`].
    pub cache_key: String,
    pub prompt: String,
    pub images: Vec<String>,
}

impl SummaryUnit {
    pub fn new(id: SummaryId, prompt: String, images: Vec<String>) -> Self {
        let cache_key = format!("{}:{}", id.label(), fingerprint(&prompt, &images));
        Self {
            id,
            cache_key,
            prompt,
            images,
        }
    }
}

/// First 16 hex digits of SHA-256 over the prompt and each image.
fn fingerprint(prompt: &str, images: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    for image in images {
        hasher.update([0u8]);
        hasher.update(image.as_bytes());
    }
    let hex = format!("{:x}", hasher.finalize());
    hex[..16].to_string()
}

/// Units to run plus the segments that were too short to summarise.
#[derive(Debug, Default)]
pub struct SummaryPlan {
    pub units: Vec<SummaryUnit>,
    pub skipped_segments: Vec<usize>,
}

/// Send one unit to the backend with retry.
///
/// At most [`MAX_SUMMARY_IMAGES`] images are sent whatever the unit holds.
/// A successful reply is trimmed.
pub async fn summarize(
    backend: &dyn SummarizerBackend,
    policy: &RetryPolicy,
    unit: &SummaryUnit,
) -> Attempted<String> {
    let images = &unit.images[..unit.images.len().min(MAX_SUMMARY_IMAGES)];
    let label = format!("summary {}", unit.id.label());
    let mut attempted =
        run_with_retry(policy, &label, || backend.complete(&unit.prompt, images)).await;
    attempted.outcome = attempted.outcome.map(|text| text.trim().to_string());
    attempted
}

/// Build the summary units for one talk.
pub fn plan(
    mode: SummaryMode,
    segments: &[Segment],
    records: &[SlideRecord],
    config: &DigestConfig,
) -> SummaryPlan {
    let max_images = config.max_summary_images.min(MAX_SUMMARY_IMAGES);
    let mut plan = SummaryPlan::default();

    match mode {
        SummaryMode::PerSlide => {
            for record in records {
                if record.encoded_image.is_empty() && record.raw_text.is_empty() {
                    continue;
                }
                let images = if record.encoded_image.is_empty() {
                    Vec::new()
                } else {
                    vec![record.encoded_image.clone()]
                };
                plan.units.push(SummaryUnit::new(
                    SummaryId::Slide(record.index),
                    slide_summary_prompt(&record.raw_text),
                    images,
                ));
            }
        }
        SummaryMode::Talk { .. } | SummaryMode::Workshop => {
            let include_attribution = matches!(
                mode,
                SummaryMode::Talk {
                    include_attribution: true
                }
            );
            for segment in segments {
                if segment.text_chars() <= config.min_segment_chars {
                    debug!(
                        "Segment {}: {} chars, too short to summarise",
                        segment.number,
                        segment.text_chars()
                    );
                    plan.skipped_segments.push(segment.number);
                    continue;
                }
                let mut images = segment.graphic_images();
                images.truncate(max_images);
                plan.units.push(SummaryUnit::new(
                    SummaryId::Segment(segment.number),
                    summary_prompt(&segment.text, include_attribution),
                    images,
                ));
            }
        }
    }
    plan
}

/// Run every unit, at most `config.concurrency` at a time.
///
/// Results come back in unit order (segment or slide number), not completion
/// order.
pub async fn dispatch(
    units: Vec<SummaryUnit>,
    backend: &dyn SummarizerBackend,
    cache: &ExtractionCache,
    config: &DigestConfig,
) -> (Vec<SummaryResult>, Vec<UnitError>) {
    let total = units.len();
    info!("Summarising {} unit(s), {} at a time", total, config.concurrency);

    let outcomes: Vec<(SummaryId, Result<String, UnitError>)> =
        stream::iter(units.into_iter().map(|unit| async move {
            let result = run_unit(&unit, backend, cache, &config.retry).await;
            if let Some(ref cb) = config.progress_callback {
                cb.on_summary_complete(&unit.id.label(), result.is_ok());
            }
            (unit.id, result)
        }))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    let mut summaries = Vec::with_capacity(total);
    let mut errors = Vec::new();
    for (id, result) in outcomes {
        match result {
            Ok(text) => summaries.push(SummaryResult { id, text }),
            Err(e) => errors.push(e),
        }
    }
    summaries.sort_by(|a, b| a.id.cmp(&b.id));
    (summaries, errors)
}

async fn run_unit(
    unit: &SummaryUnit,
    backend: &dyn SummarizerBackend,
    cache: &ExtractionCache,
    retry: &RetryPolicy,
) -> Result<String, UnitError> {
    let label = unit.id.label();
    if let Some(cached) = cache.summary(&unit.cache_key).await {
        debug!("Summary '{}': cache hit", label);
        return Ok(cached);
    }

    let attempted = summarize(backend, retry, unit).await;
    match attempted.outcome {
        Ok(text) => {
            cache.record_summary(&unit.cache_key, &text).await;
            Ok(text)
        }
        Err(e) => {
            warn!("Summary '{}' failed: {}", label, e);
            Err(UnitError::Summary {
                key: label,
                attempts: attempted.attempts,
                detail: e.to_string(),
            })
        }
    }
}
