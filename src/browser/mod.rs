//! The browser capability the navigator drives.
//!
//! The pipeline never constructs a browser itself; it receives an
//! `Arc<dyn BrowserSession>` and uses it strictly sequentially (advancing a
//! slide and capturing it must not interleave with another traversal).
//! Whoever opened the session closes it: the CLI calls
//! [`BrowserSession::close`] after the batch returns, whatever the outcome.
//!
//! [`webdriver::WebDriverSession`] is the bundled implementation, talking the
//! W3C WebDriver protocol to a running `chromedriver`.

pub mod webdriver;

use crate::error::BrowserError;
use async_trait::async_trait;
use std::time::Duration;

pub use webdriver::{WebDriverConfig, WebDriverSession};

/// One live browser window.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Load `url` in the current window and wait for the page load.
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Wait up to `wait` for the first `<tag>` element and read `attribute`.
    ///
    /// Returns [`BrowserError::ElementNotFound`] when nothing appears in time
    /// and `Ok(None)` when the element exists without the attribute.
    async fn element_attribute(
        &self,
        tag: &str,
        attribute: &str,
        wait: Duration,
    ) -> Result<Option<String>, BrowserError>;

    /// Current page HTML.
    async fn page_source(&self) -> Result<String, BrowserError>;

    /// Current viewport as PNG bytes.
    async fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError>;

    /// Run a script in the page for its side effects.
    async fn execute_script(&self, script: &str) -> Result<(), BrowserError>;

    /// Dispatch a right-arrow key press to the focused document.
    async fn press_right_arrow(&self) -> Result<(), BrowserError>;

    /// End the session and release the browser.
    async fn close(&self) -> Result<(), BrowserError>;
}
