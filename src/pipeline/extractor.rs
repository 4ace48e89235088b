//! Slide extraction: capture → text → thumbnail → graphic classification.
//!
//! Cache first. A slide already in the cache costs no screenshot and no
//! backend call; its stored classification is reused the same way. Anything
//! that goes wrong while reading a slide degrades to an empty text plus a
//! [`UnitError`] so the traversal can keep going. Only a dead browser
//! (screenshot failure) aborts the talk.

use crate::backend::{ask_yes_no, SummarizerBackend};
use crate::browser::BrowserSession;
use crate::error::{DigestError, UnitError};
use crate::output::{DeckSession, SlideRecord};
use crate::pipeline::cache::ExtractionCache;
use crate::pipeline::preprocess;
use crate::pipeline::recognize::TextRecognizer;
use crate::prompts::unique_graphic_prompt;
use crate::retry::RetryPolicy;
use image::DynamicImage;
use tracing::{debug, info, warn};

/// One extracted slide plus what it cost.
#[derive(Debug)]
pub struct Extraction {
    pub record: SlideRecord,
    /// Text and image came from the cache.
    pub from_cache: bool,
    pub errors: Vec<UnitError>,
}

/// Reads the slide currently shown in the browser.
pub struct SlideExtractor<'a> {
    pub browser: &'a dyn BrowserSession,
    pub backend: &'a dyn SummarizerBackend,
    pub recognizer: &'a dyn TextRecognizer,
    pub cache: &'a ExtractionCache,
    pub retry: RetryPolicy,
    /// Ask the "graphic adds information" question. Off for per-slide
    /// summaries, which always send the slide image.
    pub classify_graphics: bool,
}

impl SlideExtractor<'_> {
    pub async fn extract(&self, deck: &DeckSession, index: usize) -> Result<Extraction, DigestError> {
        let mut errors = Vec::new();

        let (raw_text, encoded_image, from_cache) = match self.cache.slide(index).await {
            Some((text, image)) => {
                debug!("Slide {}/{}: cache hit", index, deck.total_slides);
                (text, image, true)
            }
            None => {
                let (text, image) = self.capture(index, &mut errors).await?;
                (text, image, false)
            }
        };

        let has_unique_graphic = if self.classify_graphics && !encoded_image.is_empty() {
            self.unique_graphic(index, &raw_text, &encoded_image, &mut errors)
                .await
        } else {
            false
        };

        Ok(Extraction {
            record: SlideRecord {
                index,
                raw_text,
                encoded_image,
                has_unique_graphic,
            },
            from_cache,
            errors,
        })
    }

    /// Screenshot and read the current slide. Successful reads are cached.
    async fn capture(
        &self,
        index: usize,
        errors: &mut Vec<UnitError>,
    ) -> Result<(String, String), DigestError> {
        info!("Capturing slide {}", index);
        let png = self.browser.screenshot_png().await?;

        let decoded = tokio::task::spawn_blocking(move || -> Result<(DynamicImage, String), String> {
            let frame = preprocess::decode_frame(&png).map_err(|e| e.to_string())?;
            let thumb = preprocess::thumbnail(&frame).map_err(|e| e.to_string())?;
            Ok((frame, thumb))
        })
        .await
        .map_err(|e| DigestError::Internal(format!("Frame decode task panicked: {}", e)))?;

        let (frame, thumbnail) = match decoded {
            Ok(pair) => pair,
            Err(detail) => {
                warn!("Slide {}: unreadable screenshot: {}", index, detail);
                errors.push(UnitError::SlideText { slide: index, detail });
                return Ok((String::new(), String::new()));
            }
        };

        match self.recognizer.recognize(&frame, index).await {
            Ok(text) => {
                debug!("Slide {}: {} chars of text", index, text.chars().count());
                self.cache.record_slide(index, &text, &thumbnail).await;
                Ok((text, thumbnail))
            }
            Err(e) => {
                warn!("Slide {}: text extraction failed: {}", index, e);
                errors.push(UnitError::SlideText {
                    slide: index,
                    detail: e.to_string(),
                });
                Ok((String::new(), thumbnail))
            }
        }
    }

    async fn unique_graphic(
        &self,
        index: usize,
        text: &str,
        image: &str,
        errors: &mut Vec<UnitError>,
    ) -> bool {
        if let Some(cached) = self.cache.classification(index).await.unique_graphic {
            return cached;
        }

        let context = format!("slide {index} graphic check");
        let attempted = ask_yes_no(
            self.backend,
            &self.retry,
            image,
            &unique_graphic_prompt(text),
            &context,
        )
        .await;

        match attempted.outcome {
            Ok(answer) => {
                debug!("Slide {}: unique graphic = {}", index, answer);
                self.cache.record_unique_graphic(index, answer).await;
                answer
            }
            Err(e) => {
                errors.push(UnitError::Classification {
                    slide: index,
                    question: "unique graphic".into(),
                    attempts: attempted.attempts,
                    detail: e.to_string(),
                });
                false
            }
        }
    }
}
