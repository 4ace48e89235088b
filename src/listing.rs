//! Talk links from a conference program page.
//!
//! Program pages list each talk as an `a.small-title` anchor. Links are kept
//! in page order, filtered by a path fragment (e.g. `/virtual/2025/oral/`),
//! resolved against the page URL and deduplicated.

use crate::browser::BrowserSession;
use crate::error::DigestError;
use reqwest::Url;
use scraper::{Html, Selector};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

const TALK_LINK_SELECTOR: &str = "a.small-title";

/// Pull talk URLs out of program-page HTML.
pub fn extract_talk_links(html: &str, page_url: &str, fragment: Option<&str>) -> Result<Vec<String>, DigestError> {
    let base = Url::parse(page_url)
        .map_err(|e| DigestError::InvalidConfig(format!("listing URL '{page_url}': {e}")))?;
    let selector = Selector::parse(TALK_LINK_SELECTOR)
        .map_err(|e| DigestError::Internal(format!("bad selector: {e}")))?;
    let document = Html::parse_document(html);

    let mut links: Vec<String> = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if let Some(fragment) = fragment {
            if !href.contains(fragment) {
                continue;
            }
        }
        let Ok(full) = base.join(href) else {
            debug!("Skipping unparseable link {:?}", href);
            continue;
        };
        let full = full.to_string();
        if !links.contains(&full) {
            links.push(full);
        }
    }
    Ok(links)
}

/// Load a program page in the browser and collect its talk links.
pub async fn collect_talk_links(
    browser: &dyn BrowserSession,
    page_url: &str,
    fragment: Option<&str>,
) -> Result<Vec<String>, DigestError> {
    browser.navigate(page_url).await?;
    sleep(Duration::from_secs(2)).await;
    let html = browser.page_source().await?;
    let links = extract_talk_links(&html, page_url, fragment)?;
    info!("Found {} talk link(s) on {}", links.len(), page_url);
    Ok(links)
}
