//! Slide navigation: find the player, count slides, step through them.
//!
//! The talk page embeds the slide player in an `<iframe>`. We load the
//! iframe's own URL so the deck fills the viewport, strip the player chrome
//! (video, menus, tooltips, arrow buttons) and pin the slide container to the
//! window height so every screenshot is just the slide.
//!
//! ## Failure policy
//!
//! * No iframe within the wait window → [`DigestError::Discovery`]; the talk is
//!   abandoned.
//! * The "next slide" key press fails → [`Advance::Boundary`]; the traversal
//!   stops with what it has. This is the only early exit.
//! * An unreadable slide counter → fall back to a fixed count (25 by default).

use crate::browser::BrowserSession;
use crate::config::DigestConfig;
use crate::error::{BrowserError, DigestError};
use crate::output::DeckSession;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::sleep;
use tracing::{info, warn};

/// Removes player controls and overlays, then pins the slide container
/// full-height and centred.
pub const STRIP_PLAYER_CHROME_JS: &str = r#"
const videoEl = document.querySelector('video');
if (videoEl) videoEl.muted = true;
const selectorsToRemove = [
    '[data-slp-target="liveSlidesVideoControls"]',
    '[data-slp-target="liveSlidesVideoControlsGradient"]',
    '.slp__menu', '.slp__video', '.slp__videoWrapper', '.slp__player',
    '.slp__bigPlay', '.slp__zoom', 'video', 'iframe'
];
selectorsToRemove.forEach(s => document.querySelectorAll(s).forEach(el => el.remove()));
document.querySelectorAll('.slp__bigButton--next svg, .slp__bigButton--prev svg').forEach(el => el.style.display = "none");
document.querySelectorAll('.slp__bigButton--next, .slp__bigButton--prev').forEach(btn => {
    btn.style.pointerEvents = "auto";
    btn.style.background = "transparent";
    btn.style.border = "none";
    btn.style.boxShadow = "none";
    btn.removeAttribute("data-tooltip-content");
});
document.querySelectorAll('[data-tooltip-content], [data-tooltip-show], .tw-bg-opacity-89, [class*="tooltip"]').forEach(el => el.style.display = "none");
['.slp__button--syncSlidesToVideo', '.slp__button--syncVideoToSlides', '.slp__slideStats']
    .forEach(s => document.querySelectorAll(s).forEach(el => el.remove()));
document.documentElement.style.height = document.body.style.height = "100%";
document.documentElement.style.margin = document.body.style.margin = "0";
document.documentElement.style.padding = document.body.style.padding = "0";
const sc = document.querySelector('.slp__slides');
if (sc) {
    const w = parseFloat(sc.style.width || sc.offsetWidth);
    const h = parseFloat(sc.style.height || sc.offsetHeight);
    const ratio = (w && h) ? w / h : (16 / 9);
    const newHeight = window.innerHeight;
    const newWidth = ratio * newHeight;
    Object.assign(sc.style, {
        width: newWidth + "px",
        height: newHeight + "px",
        position: "fixed",
        top: "0",
        left: "50%",
        transform: "translateX(-50%)",
        overflow: "hidden"
    });
}
"#;

static RE_SLIDE_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"data-slp-target="slideCount"[^>]*>\s*(\d+)\s*</"#).unwrap());

/// Read the player's slide-count indicator from page HTML.
///
/// Returns `None` when the indicator is missing, unparseable, or zero.
pub fn parse_slide_count(html: &str) -> Option<usize> {
    RE_SLIDE_COUNT
        .captures(html)
        .and_then(|caps| caps[1].parse::<usize>().ok())
        .filter(|&n| n > 0)
}

/// Outcome of a "next slide" request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The key press was delivered.
    Moved,
    /// The key press failed; stop the traversal here.
    Boundary,
}

/// Drives the shared browser through one deck.
pub struct SlideNavigator<'a> {
    browser: &'a dyn BrowserSession,
    config: &'a DigestConfig,
}

impl<'a> SlideNavigator<'a> {
    pub fn new(browser: &'a dyn BrowserSession, config: &'a DigestConfig) -> Self {
        Self { browser, config }
    }

    /// Load the talk page, follow its player iframe, and prepare the deck.
    pub async fn discover_deck(&self, page_url: &str) -> Result<DeckSession, DigestError> {
        info!("Loading page: {}", page_url);
        self.browser.navigate(page_url).await?;

        let iframe_url = match self
            .browser
            .element_attribute("iframe", "src", self.config.iframe_wait)
            .await
        {
            Ok(Some(src)) if !src.trim().is_empty() => src,
            Ok(_) => {
                return Err(DigestError::Discovery {
                    url: page_url.to_string(),
                    reason: "iframe has no src".into(),
                })
            }
            Err(e @ BrowserError::ElementNotFound { .. }) => {
                return Err(DigestError::Discovery {
                    url: page_url.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        info!("Found iframe src: {}", iframe_url);

        self.browser.navigate(&iframe_url).await?;
        sleep(self.config.deck_settle).await;

        let total_slides = self.total_slide_count().await;

        if let Err(e) = self.browser.execute_script(STRIP_PLAYER_CHROME_JS).await {
            warn!("Could not strip player chrome (screenshots may include controls): {}", e);
        }

        Ok(DeckSession {
            source_url: page_url.to_string(),
            iframe_url,
            total_slides,
        })
    }

    /// Slide count from the player indicator, else the configured fallback,
    /// capped by `max_slides`.
    pub async fn total_slide_count(&self) -> usize {
        let parsed = match self.browser.page_source().await {
            Ok(html) => parse_slide_count(&html),
            Err(e) => {
                warn!("Could not read page source for slide count: {}", e);
                None
            }
        };
        let count = match parsed {
            Some(n) => {
                info!("Found total slide count from page: {}", n);
                n
            }
            None => {
                warn!(
                    "Slide count indicator missing, assuming {} slides",
                    self.config.fallback_slide_count
                );
                self.config.fallback_slide_count
            }
        };
        match self.config.max_slides {
            Some(cap) if cap < count => cap,
            _ => count,
        }
    }

    /// Move to the next slide and let it render.
    pub async fn advance(&self) -> Advance {
        match self.browser.press_right_arrow().await {
            Ok(()) => {
                sleep(self.config.slide_settle).await;
                Advance::Moved
            }
            Err(e) => {
                warn!("Could not send arrow key, ending traversal: {}", e);
                Advance::Boundary
            }
        }
    }
}
