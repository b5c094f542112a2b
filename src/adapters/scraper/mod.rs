//! Browser seam for portals that only publish HTML.
//!
//! Scraping adapters talk to a [`Browser`], which hands out exclusive
//! [`BrowserSession`]s. A session lives for one fetch (or one health check)
//! and the adapter closes it on every exit path. Page loads carry
//! their own timeout, separate from retry backoff, so a hung page fails
//! out instead of stalling the run.
//!
//! [`HttpBrowser`] is the default: a plain HTTP client returning the
//! server-rendered document. Tests substitute their own implementation.

pub mod houston;

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

use super::http_client;
use crate::error::AdapterError;

#[async_trait]
pub trait Browser: Send + Sync {
    /// Open a fresh session. The caller owns it exclusively.
    async fn open(&self) -> Result<Box<dyn BrowserSession>, AdapterError>;
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate to `url` and return the rendered document.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<String, AdapterError>;

    /// Release the session. Called exactly once.
    async fn close(&self);
}

/// HTTP-backed [`Browser`] for server-rendered portals.
pub struct HttpBrowser {
    client: reqwest::Client,
}

impl HttpBrowser {
    pub fn new(timeout: Duration) -> Result<Self, AdapterError> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, AdapterError> {
        Ok(Box::new(HttpSession {
            client: self.client.clone(),
        }))
    }
}

struct HttpSession {
    client: reqwest::Client,
}

#[async_trait]
impl BrowserSession for HttpSession {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<String, AdapterError> {
        let load = async {
            let resp = self.client.get(url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(AdapterError::from_status(status, url));
            }
            Ok::<String, AdapterError>(resp.text().await?)
        };
        match tokio::time::timeout(timeout, load).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Transient(format!(
                "page load timed out after {}ms: {}",
                timeout.as_millis(),
                url
            ))),
        }
    }

    async fn close(&self) {}
}

/// Compile a CSS selector, reporting failures as configuration errors.
pub(crate) fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Config(format!("bad selector {}: {:?}", css, e)))
}

/// Text of the document's `<title>`, if any.
pub fn page_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = selector("title").ok()?;
    let title = doc.select(&sel).next()?.text().collect::<String>();
    Some(title.trim().to_string())
}
