//! Pipeline integration tests against a simulated slide player.
//!
//! `DeckBrowser` plays the part of a talk site: each page may embed a player
//! iframe, the player reports a slide count, and the right-arrow key moves
//! through the deck. Every screenshot is a flat colour whose red channel
//! encodes the slide number, so the fake recognizer and the fake model can
//! tell which slide they are looking at.
//!
//! No browser, network or API key is needed.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, Rgb, RgbImage};
use slide_digest::pipeline::recognize::TextRecognizer;
use slide_digest::{
    BackendError, BrowserError, BrowserSession, DigestConfig, DigestError, Pipeline, SummaryId,
    SummaryMode, SummarizerBackend,
};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test doubles ─────────────────────────────────────────────────────────────

const PLAYER_SUFFIX: &str = "#player";

#[derive(Clone)]
struct Deck {
    slides: usize,
    /// The arrow key stops working once this slide is shown.
    stuck_at: Option<usize>,
}

#[derive(Default)]
struct DeckBrowser {
    decks: HashMap<String, Deck>,
    state: Mutex<(String, usize)>,
    screenshots: AtomicUsize,
}

impl DeckBrowser {
    fn with_deck(mut self, page: &str, deck: Deck) -> Self {
        self.decks.insert(page.to_string(), deck);
        self
    }

    fn current_deck(&self) -> Option<Deck> {
        let (url, _) = &*self.state.lock().unwrap();
        url.strip_suffix(PLAYER_SUFFIX)
            .and_then(|page| self.decks.get(page))
            .cloned()
    }
}

fn encode_slide_frame(slide: usize) -> Vec<u8> {
    let img = RgbImage::from_pixel(64, 36, Rgb([(slide * 10) as u8, 40, 40]));
    let mut png = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    png
}

fn slide_of(frame: &DynamicImage) -> usize {
    (frame.to_rgb8().get_pixel(0, 0)[0] as usize + 5) / 10
}

#[async_trait]
impl BrowserSession for DeckBrowser {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        *self.state.lock().unwrap() = (url.to_string(), 1);
        Ok(())
    }

    async fn element_attribute(
        &self,
        tag: &str,
        _attribute: &str,
        wait: Duration,
    ) -> Result<Option<String>, BrowserError> {
        let (url, _) = self.state.lock().unwrap().clone();
        if self.decks.contains_key(&url) {
            Ok(Some(format!("{url}{PLAYER_SUFFIX}")))
        } else {
            Err(BrowserError::ElementNotFound {
                tag: tag.to_string(),
                waited_secs: wait.as_secs(),
            })
        }
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        Ok(match self.current_deck() {
            Some(deck) => format!(
                r#"<div class="slp__controls"><span data-slp-target="slideCount">{}</span></div>"#,
                deck.slides
            ),
            None => "<html></html>".to_string(),
        })
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError> {
        self.screenshots.fetch_add(1, Ordering::SeqCst);
        let slide = self.state.lock().unwrap().1;
        Ok(encode_slide_frame(slide))
    }

    async fn execute_script(&self, _script: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn press_right_arrow(&self) -> Result<(), BrowserError> {
        let deck = self.current_deck();
        let mut state = self.state.lock().unwrap();
        if let Some(Deck {
            stuck_at: Some(stuck),
            ..
        }) = deck
        {
            if state.1 >= stuck {
                return Err(BrowserError::WebDriver {
                    error: "element not interactable".into(),
                    message: "player gone".into(),
                });
            }
        }
        state.1 += 1;
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        Ok(())
    }
}

/// Reads the slide number out of the frame and invents ~120 chars of text.
struct FrameText {
    /// OCR fails on this slide.
    unreadable: Option<usize>,
}

#[async_trait]
impl TextRecognizer for FrameText {
    async fn recognize(&self, frame: &DynamicImage, _slide: usize) -> Result<String, BackendError> {
        let n = slide_of(frame);
        if self.unreadable == Some(n) {
            return Err(BackendError::Failed("tesseract exited with status 1".into()));
        }
        Ok(format!("Slide {n}: {}", "method and results ".repeat(6)))
    }
}

/// Answers cover questions from a fixed set, never flags graphics, and
/// returns a short summary for anything else.
struct ScriptedModel {
    covers: HashSet<usize>,
    calls: AtomicUsize,
    cover_questions: AtomicUsize,
    summary_requests: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(covers: &[usize]) -> Self {
        Self {
            covers: covers.iter().copied().collect(),
            calls: AtomicUsize::new(0),
            cover_questions: AtomicUsize::new(0),
            summary_requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SummarizerBackend for ScriptedModel {
    async fn complete(&self, prompt: &str, images: &[String]) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains("International Conference on Learning Representations") {
            self.cover_questions.fetch_add(1, Ordering::SeqCst);
            let bytes = STANDARD.decode(&images[0]).unwrap();
            let slide = slide_of(&image::load_from_memory(&bytes).unwrap());
            return Ok(if self.covers.contains(&slide) { "yes" } else { "no" }.to_string());
        }
        if prompt.starts_with("Does this slide") {
            return Ok("no".to_string());
        }
        self.summary_requests.lock().unwrap().push(prompt.to_string());
        Ok(format!("\nA summary over {} images.\n", images.len()))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(cache_dir: &Path, mode: SummaryMode) -> DigestConfig {
    init_tracing();
    DigestConfig::builder()
        .mode(mode)
        .cache_dir(cache_dir)
        .iframe_wait(Duration::from_millis(10))
        .deck_settle(Duration::ZERO)
        .slide_settle(Duration::ZERO)
        .build()
        .unwrap()
}

fn pipeline(
    browser: Arc<DeckBrowser>,
    model: Arc<ScriptedModel>,
    recognizer: FrameText,
    config: DigestConfig,
) -> Pipeline {
    Pipeline::new(browser, model, config).with_recognizer(Box::new(recognizer))
}

fn recognizer() -> FrameText {
    FrameText { unreadable: None }
}

const WORKSHOP: &str = "https://conf.example/virtual/2025/workshop/1";
const ORAL: &str = "https://conf.example/virtual/2025/oral/7";

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn workshop_splits_on_cover_slides() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Arc::new(DeckBrowser::default().with_deck(
        WORKSHOP,
        Deck {
            slides: 6,
            stuck_at: None,
        },
    ));
    let model = Arc::new(ScriptedModel::new(&[1, 4]));
    let p = pipeline(
        browser.clone(),
        model.clone(),
        recognizer(),
        config(dir.path(), SummaryMode::Workshop),
    );

    let digest = p.run_talk(WORKSHOP).await.unwrap();

    assert_eq!(digest.deck.total_slides, 6);
    assert_eq!(digest.stats.slides_captured, 6);
    assert_eq!(digest.stats.segments, 2);
    assert_eq!(
        digest.summaries.iter().map(|s| s.id.clone()).collect::<Vec<_>>(),
        vec![SummaryId::Segment(1), SummaryId::Segment(2)]
    );
    assert!(digest.failed_units.is_empty());
    assert_eq!(digest.summaries[0].text, "A summary over 0 images.");
    assert!(digest.render().contains("Summary of slideshow 2:"));
    assert_eq!(model.cover_questions.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn second_run_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let deck = Deck {
        slides: 5,
        stuck_at: None,
    };

    let first_browser = Arc::new(DeckBrowser::default().with_deck(WORKSHOP, deck.clone()));
    let first_model = Arc::new(ScriptedModel::new(&[3]));
    let first = pipeline(
        first_browser,
        first_model.clone(),
        recognizer(),
        config(dir.path(), SummaryMode::Workshop),
    )
    .run_talk(WORKSHOP)
    .await
    .unwrap();
    assert!(first_model.calls.load(Ordering::SeqCst) > 0);

    let second_browser = Arc::new(DeckBrowser::default().with_deck(WORKSHOP, deck));
    let second_model = Arc::new(ScriptedModel::new(&[3]));
    let second = pipeline(
        second_browser.clone(),
        second_model.clone(),
        recognizer(),
        config(dir.path(), SummaryMode::Workshop),
    )
    .run_talk(WORKSHOP)
    .await
    .unwrap();

    assert_eq!(second_model.calls.load(Ordering::SeqCst), 0);
    assert_eq!(second_browser.screenshots.load(Ordering::SeqCst), 0);
    assert_eq!(second.stats.slides_from_cache, 5);
    assert_eq!(second.summaries, first.summaries);
}

#[tokio::test]
async fn recovered_slide_text_refreshes_the_summary() {
    let dir = tempfile::tempdir().unwrap();
    let deck = Deck {
        slides: 3,
        stuck_at: None,
    };
    let mode = SummaryMode::Talk {
        include_attribution: false,
    };

    let first_model = Arc::new(ScriptedModel::new(&[]));
    let first = pipeline(
        Arc::new(DeckBrowser::default().with_deck(ORAL, deck.clone())),
        first_model.clone(),
        FrameText { unreadable: Some(3) },
        config(dir.path(), mode),
    )
    .run_talk(ORAL)
    .await
    .unwrap();
    assert_eq!(first.failed_units.len(), 1);
    assert!(!first_model.summary_requests.lock().unwrap()[0].contains("Slide 3:"));

    let second_model = Arc::new(ScriptedModel::new(&[]));
    let second = pipeline(
        Arc::new(DeckBrowser::default().with_deck(ORAL, deck)),
        second_model.clone(),
        recognizer(),
        config(dir.path(), mode),
    )
    .run_talk(ORAL)
    .await
    .unwrap();

    assert!(second.failed_units.is_empty());
    assert_eq!(second.stats.slides_from_cache, 2);
    let requests = second_model.summary_requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].contains("Slide 3:"));
}

#[tokio::test]
async fn stuck_player_truncates_the_deck() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Arc::new(DeckBrowser::default().with_deck(
        ORAL,
        Deck {
            slides: 8,
            stuck_at: Some(3),
        },
    ));
    let model = Arc::new(ScriptedModel::new(&[]));
    let p = pipeline(
        browser.clone(),
        model,
        recognizer(),
        config(
            dir.path(),
            SummaryMode::Talk {
                include_attribution: false,
            },
        ),
    );

    let digest = p.run_talk(ORAL).await.unwrap();

    assert_eq!(digest.deck.total_slides, 8);
    assert_eq!(digest.stats.slides_captured, 3);
    assert_eq!(browser.screenshots.load(Ordering::SeqCst), 3);
    assert_eq!(digest.summaries.len(), 1);
}

#[tokio::test]
async fn talk_mode_never_asks_about_covers() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Arc::new(DeckBrowser::default().with_deck(
        ORAL,
        Deck {
            slides: 4,
            stuck_at: None,
        },
    ));
    let model = Arc::new(ScriptedModel::new(&[2]));
    let p = pipeline(
        browser,
        model.clone(),
        recognizer(),
        config(
            dir.path(),
            SummaryMode::Talk {
                include_attribution: true,
            },
        ),
    );

    let digest = p.run_talk(ORAL).await.unwrap();

    assert_eq!(model.cover_questions.load(Ordering::SeqCst), 0);
    assert_eq!(digest.stats.segments, 1);
    assert_eq!(digest.render(), "A summary over 0 images.");
}

#[tokio::test]
async fn per_slide_mode_summarises_every_slide() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Arc::new(DeckBrowser::default().with_deck(
        ORAL,
        Deck {
            slides: 3,
            stuck_at: None,
        },
    ));
    let model = Arc::new(ScriptedModel::new(&[]));
    let p = pipeline(
        browser,
        model.clone(),
        recognizer(),
        config(dir.path(), SummaryMode::PerSlide),
    );

    let digest = p.run_talk(ORAL).await.unwrap();

    assert_eq!(
        digest.summaries.iter().map(|s| s.id.clone()).collect::<Vec<_>>(),
        vec![SummaryId::Slide(1), SummaryId::Slide(2), SummaryId::Slide(3)]
    );
    assert!(digest
        .summaries
        .iter()
        .all(|s| s.text == "A summary over 1 images."));
    // Three summaries, no classification questions.
    assert_eq!(model.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn missing_player_fails_only_that_talk() {
    let dir = tempfile::tempdir().unwrap();
    let summaries_file = dir.path().join("summaries.txt");
    let browser = Arc::new(DeckBrowser::default().with_deck(
        ORAL,
        Deck {
            slides: 3,
            stuck_at: None,
        },
    ));
    let model = Arc::new(ScriptedModel::new(&[]));
    init_tracing();
    let config = DigestConfig::builder()
        .mode(SummaryMode::Talk {
            include_attribution: false,
        })
        .cache_dir(dir.path().join("cache"))
        .summaries_file(&summaries_file)
        .iframe_wait(Duration::from_millis(10))
        .deck_settle(Duration::ZERO)
        .slide_settle(Duration::ZERO)
        .build()
        .unwrap();
    let p = pipeline(browser, model, recognizer(), config);

    let urls = vec![
        "https://conf.example/virtual/2025/oral/404".to_string(),
        ORAL.to_string(),
    ];
    let report = p.run_batch(&urls).await;

    assert_eq!(report.talks.len(), 2);
    assert_eq!(report.succeeded(), 1);
    assert!(matches!(
        report.talks[0].result,
        Err(DigestError::Discovery { .. })
    ));
    assert!(report.talks[1].result.is_ok());

    let written = std::fs::read_to_string(&summaries_file).unwrap();
    assert_eq!(written, "\nOral Talk 2 summary:\nA summary over 0 images.\n");
    assert_eq!(report.render(p.config().mode), written);
}
