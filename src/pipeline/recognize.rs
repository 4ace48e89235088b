//! Slide text recognition.
//!
//! Two interchangeable sources, picked by [`TextSource`]:
//!
//! - [`VisionRecognizer`] sends a binarised 640×360 frame to the vision model
//!   and asks for a verbatim transcription (retried on rate limits).
//! - [`TesseractRecognizer`] pipes a binarised full-size frame through the
//!   local `tesseract` binary in single-block mode (`--psm 6`).

use crate::backend::SummarizerBackend;
use crate::config::{DigestConfig, TextSource};
use crate::error::BackendError;
use crate::pipeline::preprocess;
use crate::prompts::TRANSCRIBE_SLIDE_PROMPT;
use crate::retry::{run_with_retry, RetryPolicy};
use async_trait::async_trait;
use image::DynamicImage;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Reads the text on one captured slide.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, frame: &DynamicImage, slide: usize) -> Result<String, BackendError>;
}

/// Build the recognizer selected in `config`.
pub fn recognizer_for(
    config: &DigestConfig,
    backend: Arc<dyn SummarizerBackend>,
) -> Box<dyn TextRecognizer> {
    match config.text_source {
        TextSource::Vision => Box::new(VisionRecognizer::new(backend, config.retry)),
        TextSource::Ocr => Box::new(TesseractRecognizer::default()),
    }
}

/// Transcription through the vision model.
pub struct VisionRecognizer {
    backend: Arc<dyn SummarizerBackend>,
    retry: RetryPolicy,
}

impl VisionRecognizer {
    pub fn new(backend: Arc<dyn SummarizerBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }
}

#[async_trait]
impl TextRecognizer for VisionRecognizer {
    async fn recognize(&self, frame: &DynamicImage, slide: usize) -> Result<String, BackendError> {
        let image = preprocess::vision_frame(frame)
            .map_err(|e| BackendError::Failed(format!("frame encoding failed: {e}")))?;
        let images = [image];
        let label = format!("slide {slide} transcription");
        let backend = self.backend.as_ref();
        run_with_retry(&self.retry, &label, || {
            backend.complete(TRANSCRIBE_SLIDE_PROMPT, &images)
        })
        .await
        .outcome
    }
}

/// Local OCR through the `tesseract` command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    /// Executable name or path. Default: `tesseract`.
    pub binary: String,
    /// Page segmentation mode. Default: 6 (one uniform block of text).
    pub psm: u8,
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            psm: 6,
        }
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, frame: &DynamicImage, slide: usize) -> Result<String, BackendError> {
        let png = preprocess::ocr_frame(frame)
            .map_err(|e| BackendError::Failed(format!("frame encoding failed: {e}")))?;

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "--psm", &self.psm.to_string()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BackendError::Failed(format!("could not run {}: {e}", self.binary)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&png)
                .await
                .map_err(|e| BackendError::Failed(format!("tesseract stdin: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| BackendError::Failed(format!("tesseract: {e}")))?;
        if !output.status.success() {
            return Err(BackendError::Failed(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("Slide {}: tesseract read {} chars", slide, text.len());
        Ok(text)
    }
}
