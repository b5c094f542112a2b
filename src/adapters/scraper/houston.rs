//! Houston health-inspection portal scraper.
//!
//! The portal lists pools ten per search page. For each search page the
//! adapter visits every facility page, splits the page text into one
//! section per `Date: MM/DD/YYYY` heading and emits one record per
//! inspection. The cursor is `{start, facilityIndex}` encoded into an
//! `offset` cursor; `start` is the portal's 1-based search offset.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;
use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use poolwatch_core::cursor::CursorState;
use poolwatch_core::models::{FetchResult, RawPayload, Source};

use super::{page_title, selector, Browser, BrowserSession};
use crate::adapters::{parse_settings, Adapter, HEALTH_CHECK_TIMEOUT};
use crate::error::AdapterError;
use crate::retry::{log_retry, RetryPolicy};

pub const DEFAULT_BASE_URL: &str = "https://tx.healthinspections.us/houston";

/// Facilities per search results page.
const PAGE_SIZE: u32 = 10;

static FACILITY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"facilityID=([^&]+)").unwrap());
static INSPECTION_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"inspectionID=([^&]+)").unwrap());
static CITY_STATE_ZIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z\s]+),\s*([A-Z]{2})\s*(\d{5})").unwrap());
static DATE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Date:\s*(\d{2}/\d{2}/\d{4})").unwrap());
static VIOLATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+\.\d+[^\n-]*)").unwrap());

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoustonSettings {
    /// Maximum records emitted per fetch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Page load timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Pause between facility pages.
    #[serde(default = "default_facility_delay_ms")]
    pub facility_delay_ms: u64,
}

fn default_batch_size() -> usize {
    50
}
fn default_timeout() -> u64 {
    30_000
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_facility_delay_ms() -> u64 {
    300
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageCursor {
    start: u32,
    facility_index: u32,
}

impl Default for PageCursor {
    fn default() -> Self {
        Self {
            start: 1,
            facility_index: 0,
        }
    }
}

#[derive(Debug, PartialEq)]
struct SearchPage {
    /// `(facility id, listed name)` in page order, deduplicated.
    facilities: Vec<(String, String)>,
    has_next_link: bool,
}

pub struct HoustonScraper {
    base_url: String,
    settings: HoustonSettings,
    browser: Arc<dyn Browser>,
    policy: RetryPolicy,
}

impl HoustonScraper {
    pub fn new(
        source: &Source,
        policy: &RetryPolicy,
        browser: Arc<dyn Browser>,
    ) -> Result<Self, AdapterError> {
        let settings: HoustonSettings = parse_settings(&source.config)?;
        if settings.batch_size == 0 {
            return Err(AdapterError::Config("batchSize must be > 0".into()));
        }
        let base_url = match source.endpoint.trim().trim_end_matches('/') {
            "" => DEFAULT_BASE_URL.to_string(),
            url => url.to_string(),
        };
        Ok(Self {
            base_url,
            policy: policy.clone().with_attempts(settings.retry_attempts),
            settings,
            browser,
        })
    }

    pub fn settings(&self) -> &HoustonSettings {
        &self.settings
    }

    fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.timeout)
    }

    async fn load(&self, session: &dyn BrowserSession, url: &str) -> Result<String, AdapterError> {
        let timeout = self.page_timeout();
        (move || session.goto(url, timeout))
            .retry(self.policy.backoff())
            .when(AdapterError::is_transient)
            .notify(log_retry)
            .await
    }

    async fn scrape(
        &self,
        session: &dyn BrowserSession,
        cursor: PageCursor,
    ) -> Result<FetchResult, AdapterError> {
        let search_url = format!(
            "{}/search.cfm?start={}&1=1&facType=Pool",
            self.base_url, cursor.start
        );
        info!(start = cursor.start, "Fetching Houston pool search page");
        let html = self.load(session, &search_url).await?;
        let page = parse_search_page(&html, cursor.start)?;
        debug!(facilities = page.facilities.len(), "Parsed search page");

        let mut records = Vec::new();
        let mut index = cursor.facility_index as usize;
        while let Some((facility_id, facility_name)) = page.facilities.get(index) {
            if records.len() >= self.settings.batch_size {
                break;
            }
            let url = facility_url(&self.base_url, facility_id);
            let html = self.load(session, &url).await?;
            records.extend(parse_facility_page(&html, facility_id, facility_name)?);
            index += 1;

            if self.settings.facility_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.settings.facility_delay_ms)).await;
            }
        }

        let next = if index < page.facilities.len() {
            // Batch filled mid-page: come back for the rest of this page.
            Some(PageCursor {
                start: cursor.start,
                facility_index: index as u32,
            })
        } else if page.has_next_link || page.facilities.len() == PAGE_SIZE as usize {
            Some(PageCursor {
                start: cursor.start + PAGE_SIZE,
                facility_index: 0,
            })
        } else {
            None
        };

        match next {
            Some(next) => {
                let next = CursorState::encode(&next)
                    .map_err(|e| AdapterError::Protocol(e.to_string()))?;
                Ok(FetchResult::more(records, next))
            }
            None => Ok(FetchResult::last(records)),
        }
    }
}

pub fn facility_url(base_url: &str, facility_id: &str) -> String {
    format!("{}/estab.cfm?facilityID={}", base_url, facility_id)
}

fn parse_search_page(html: &str, start: u32) -> Result<SearchPage, AdapterError> {
    let doc = Html::parse_document(html);
    let links = selector(r#"a[href*="facilityID="]"#)?;
    let any_link = selector("a[href]")?;

    let mut facilities: Vec<(String, String)> = Vec::new();
    for a in doc.select(&links) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        if href.contains("inspectionID") {
            continue;
        }
        let Some(caps) = FACILITY_ID.captures(href) else {
            continue;
        };
        let name = a.text().collect::<String>().trim().to_string();
        if name.is_empty() {
            continue;
        }
        let id = caps[1].to_string();
        match facilities.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = name,
            None => facilities.push((id, name)),
        }
    }

    let next_marker = format!("start={}", start + PAGE_SIZE);
    let has_next_link = doc
        .select(&any_link)
        .filter_map(|a| a.value().attr("href"))
        .any(|href| href.contains(&next_marker));

    Ok(SearchPage {
        facilities,
        has_next_link,
    })
}

fn parse_facility_page(
    html: &str,
    facility_id: &str,
    facility_name: &str,
) -> Result<Vec<RawPayload>, AdapterError> {
    let doc = Html::parse_document(html);
    let demographic_sel = selector("#demographic")?;
    let body_sel = selector("body")?;
    let inspection_sel = selector(r#"a[href*="inspectionID"]"#)?;

    let mut address = String::new();
    let mut city = "HOUSTON".to_string();
    let mut state = "TX".to_string();
    let mut zip = String::new();

    if let Some(demo) = doc.select(&demographic_sel).next() {
        let text = demo.text().collect::<String>();
        let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        // name, street, "CITY, ST 12345"
        if let Some(street) = lines.get(1) {
            address = street.to_string();
        }
        if let Some(caps) = lines.iter().find_map(|l| CITY_STATE_ZIP.captures(l)) {
            city = caps[1].trim().to_string();
            state = caps[2].to_string();
            zip = caps[3].to_string();
        }
    }

    let page_text = match doc.select(&body_sel).next() {
        Some(body) => body.text().collect::<String>(),
        None => doc.root_element().text().collect::<String>(),
    };

    let mut inspection_ids: Vec<String> = Vec::new();
    for a in doc.select(&inspection_sel) {
        if let Some(caps) = a.value().attr("href").and_then(|h| INSPECTION_ID.captures(h)) {
            let id = caps[1].to_string();
            if !inspection_ids.contains(&id) {
                inspection_ids.push(id);
            }
        }
    }

    let dates: Vec<String> = DATE_HEADING
        .captures_iter(&page_text)
        .map(|c| c[1].to_string())
        .collect();
    let sections: Vec<&str> = DATE_HEADING.split(&page_text).collect();

    let mut records = Vec::with_capacity(dates.len());
    for (i, date) in dates.iter().enumerate() {
        let dashed = date.replace('/', "-");
        let inspection_id = inspection_ids
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("{}-{}", facility_id, dashed));

        let section = sections.get(i + 1).copied().unwrap_or("");
        let violations: Vec<String> = VIOLATION
            .captures_iter(section)
            .map(|c| c[1].trim().to_string())
            .filter(|v| !v.is_empty() && !v.contains("View Full"))
            .collect();

        let result = if violations.is_empty() {
            "Pass"
        } else {
            "Violations Found"
        };

        records.push(RawPayload::new(
            format!("houston-{}-{}", facility_id, dashed),
            json!({
                "facilityId": facility_id,
                "facilityName": facility_name,
                "address": address,
                "city": city,
                "state": state,
                "zip": zip,
                "inspectionDate": date,
                "inspectionId": inspection_id,
                "violationCount": violations.len(),
                "violations": violations,
                "result": result,
            }),
        ));
    }

    Ok(records)
}

#[async_trait]
impl Adapter for HoustonScraper {
    fn name(&self) -> &str {
        "houston-scraper"
    }

    async fn fetch(&self, cursor: Option<&CursorState>) -> Result<FetchResult, AdapterError> {
        let state = cursor
            .and_then(|c| c.decode::<PageCursor>())
            .unwrap_or_default();

        let session = self.browser.open().await?;
        let result = self.scrape(session.as_ref(), state).await;
        session.close().await;
        result
    }

    fn initial_cursor(&self) -> CursorState {
        CursorState::encode(&PageCursor::default()).unwrap_or_else(|_| CursorState::offset(1))
    }

    fn incremental_cursor(&self, _last_sync: Option<DateTime<Utc>>) -> CursorState {
        // The portal has no change feed; rescan from the first page.
        self.initial_cursor()
    }

    async fn health_check(&self) -> bool {
        let Ok(session) = self.browser.open().await else {
            return false;
        };
        let url = format!("{}/index.cfm", self.base_url);
        let html = session.goto(&url, HEALTH_CHECK_TIMEOUT).await;
        session.close().await;
        match html {
            Ok(html) => page_title(&html).is_some_and(|t| t.contains("Houston")),
            Err(_) => false,
        }
    }
}
