//! Minimal W3C WebDriver client over `reqwest`.
//!
//! Only the handful of endpoints the navigator needs are implemented. Every
//! response is a JSON object with a `value` member; errors carry
//! `value.error` and `value.message` and usually a 4xx/5xx status.
//!
//! Start a driver first, e.g. `chromedriver --port=9515`.

use super::BrowserSession;
use crate::error::BrowserError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// W3C element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// WebDriver key code for ArrowRight.
const KEY_ARROW_RIGHT: &str = "\u{E014}";

/// How often to poll while waiting for an element.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Browser launch options.
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    /// Driver endpoint. Default: `http://localhost:9515` (chromedriver).
    pub url: String,
    /// Run Chrome without a window. Default: false.
    pub headless: bool,
    /// Window size in CSS pixels. Default: 1920×1080.
    pub window_size: (u32, u32),
    /// Override the browser user agent.
    pub user_agent: Option<String>,
    /// Page-load timeout applied to the session. Default: 60 s.
    pub page_load_timeout: Duration,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9515".to_string(),
            headless: false,
            window_size: (1920, 1080),
            user_agent: Some(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36"
                    .to_string(),
            ),
            page_load_timeout: Duration::from_secs(60),
        }
    }
}

impl WebDriverConfig {
    fn chrome_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--window-size={},{}", self.window_size.0, self.window_size.1),
            "--disable-gpu".to_string(),
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        if let Some(ref ua) = self.user_agent {
            args.push(format!("user-agent={ua}"));
        }
        args
    }
}

/// A Chrome session driven through chromedriver.
pub struct WebDriverSession {
    client: reqwest::Client,
    base: String,
    session_id: String,
    closed: AtomicBool,
}

impl WebDriverSession {
    /// Open a new browser session.
    pub async fn open(config: &WebDriverConfig) -> Result<Self, BrowserError> {
        let client = reqwest::Client::builder()
            .timeout(config.page_load_timeout + Duration::from_secs(30))
            .build()?;
        let base = config.url.trim_end_matches('/').to_string();

        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": config.chrome_args() }
                }
            }
        });
        let value = send(&client, Method::POST, &format!("{base}/session"), Some(body)).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol(format!("no sessionId in {value}")))?
            .to_string();
        info!("WebDriver session {} opened at {}", session_id, base);

        let session = Self {
            client,
            base,
            session_id,
            closed: AtomicBool::new(false),
        };
        session
            .command(
                Method::POST,
                "timeouts",
                Some(json!({ "pageLoad": config.page_load_timeout.as_millis() as u64 })),
            )
            .await?;
        Ok(session)
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, BrowserError> {
        let url = if path.is_empty() {
            format!("{}/session/{}", self.base, self.session_id)
        } else {
            format!("{}/session/{}/{}", self.base, self.session_id, path)
        };
        send(&self.client, method, &url, body).await
    }

    async fn find_first(&self, tag: &str) -> Result<Option<String>, BrowserError> {
        let body = json!({ "using": "tag name", "value": tag });
        match self.command(Method::POST, "element", Some(body)).await {
            Ok(value) => value
                .get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| Some(id.to_string()))
                .ok_or_else(|| BrowserError::Protocol(format!("no element reference in {value}"))),
            Err(BrowserError::WebDriver { ref error, .. }) if error == "no such element" => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        debug!("navigate → {}", url);
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn element_attribute(
        &self,
        tag: &str,
        attribute: &str,
        wait: Duration,
    ) -> Result<Option<String>, BrowserError> {
        let deadline = Instant::now() + wait;
        let element = loop {
            if let Some(id) = self.find_first(tag).await? {
                break id;
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::ElementNotFound {
                    tag: tag.to_string(),
                    waited_secs: wait.as_secs(),
                });
            }
            sleep(POLL_INTERVAL).await;
        };

        let value = self
            .command(
                Method::GET,
                &format!("element/{element}/attribute/{attribute}"),
                None,
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        let value = self.command(Method::GET, "source", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Protocol("page source is not a string".into()))
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError> {
        let value = self.command(Method::GET, "screenshot", None).await?;
        let b64 = value
            .as_str()
            .ok_or_else(|| BrowserError::Protocol("screenshot is not a string".into()))?;
        STANDARD
            .decode(b64)
            .map_err(|e| BrowserError::Protocol(format!("screenshot is not base64: {e}")))
    }

    async fn execute_script(&self, script: &str) -> Result<(), BrowserError> {
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": [] })),
        )
        .await
        .map(|_| ())
    }

    async fn press_right_arrow(&self) -> Result<(), BrowserError> {
        let body = json!({
            "actions": [{
                "type": "key",
                "id": "keyboard",
                "actions": [
                    { "type": "keyDown", "value": KEY_ARROW_RIGHT },
                    { "type": "keyUp", "value": KEY_ARROW_RIGHT }
                ]
            }]
        });
        self.command(Method::POST, "actions", Some(body)).await.map(|_| ())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Closing WebDriver session {}", self.session_id);
        self.command(Method::DELETE, "", None).await.map(|_| ())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            warn!(
                "WebDriver session {} dropped without close(); the browser may linger",
                self.session_id
            );
        }
    }
}

/// One WebDriver round-trip, unwrapping `value` and mapping error objects.
async fn send(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, BrowserError> {
    let request = client.request(method, url);
    let request = match body {
        Some(b) => request.json(&b),
        None => request,
    };
    let response = request.send().await?;
    let status = response.status();
    let payload: Value = response.json().await?;
    parse_payload(status.is_success(), payload)
}

fn parse_payload(success: bool, mut payload: Value) -> Result<Value, BrowserError> {
    let value = payload
        .get_mut("value")
        .map(Value::take)
        .unwrap_or(Value::Null);

    if let Some(error) = value.get("error").and_then(Value::as_str) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(BrowserError::WebDriver {
            error: error.to_string(),
            message,
        });
    }
    if !success {
        return Err(BrowserError::Protocol(format!("unsuccessful response: {value}")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_unwraps_value() {
        let v = parse_payload(true, json!({ "value": { "sessionId": "abc" } })).unwrap();
        assert_eq!(v["sessionId"], "abc");
    }

    #[test]
    fn parse_maps_error_object() {
        let err = parse_payload(
            false,
            json!({ "value": { "error": "no such element", "message": "iframe", "stacktrace": "" } }),
        )
        .unwrap_err();
        match err {
            BrowserError::WebDriver { error, message } => {
                assert_eq!(error, "no such element");
                assert_eq!(message, "iframe");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn null_value_is_ok_for_commands() {
        assert_eq!(parse_payload(true, json!({ "value": null })).unwrap(), Value::Null);
    }

    #[test]
    fn chrome_args_follow_config() {
        let mut c = WebDriverConfig::default();
        assert!(!c.chrome_args().iter().any(|a| a.starts_with("--headless")));
        c.headless = true;
        c.user_agent = None;
        let args = c.chrome_args();
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--window-size=1920,1080".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("user-agent")));
    }
}
