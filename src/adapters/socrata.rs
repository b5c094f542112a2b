//! Socrata (SODA) paginated REST adapter.
//!
//! Backfills page through the dataset with `$limit`/`$offset` ordered by
//! `orderByField`. Incremental runs filter on the updated-at column with
//! `$where <field> > '<watermark>'` and page inside that window with an
//! extra offset carried on the timestamp cursor, so a bulk update that
//! stamps many rows with one watermark is never cut short.
//!
//! # Configuration
//!
//! ```toml
//! [[sources]]
//! id = "austin-pools"
//! adapter_type = "SOCRATA"
//! endpoint = "https://data.austintexas.gov/resource/abcd-1234.json"
//! config = { orderByField = "inspection_date", idField = "facility_id", batchSize = 1000 }
//! ```
//!
//! `SOCRATA_APP_TOKEN` is sent as `X-App-Token` when set.

use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use poolwatch_core::cursor::{CursorKind, CursorState};
use poolwatch_core::models::{FetchResult, RawPayload, Source};

use super::{http_client, id_component, parse_settings, Adapter, HEALTH_CHECK_TIMEOUT};
use crate::error::AdapterError;
use crate::retry::{log_retry, RetryPolicy};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocrataSettings {
    #[serde(default = "default_updated_at_field")]
    pub updated_at_field: String,
    #[serde(default = "default_order_by_field")]
    pub order_by_field: String,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Overlap subtracted from the last sync time on incremental runs.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,
    /// Window used for an incremental run on a source that never synced.
    #[serde(default = "default_initial_lookback_hours")]
    pub initial_lookback_hours: i64,
}

fn default_updated_at_field() -> String {
    ":updated_at".to_string()
}
fn default_order_by_field() -> String {
    "inspection_date".to_string()
}
fn default_id_field() -> String {
    "facility_id".to_string()
}
fn default_batch_size() -> u32 {
    1000
}
fn default_timeout() -> u64 {
    30_000
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_lookback_hours() -> i64 {
    24
}
fn default_initial_lookback_hours() -> i64 {
    48
}

pub struct SocrataAdapter {
    endpoint: String,
    settings: SocrataSettings,
    client: reqwest::Client,
    policy: RetryPolicy,
    app_token: Option<String>,
}

impl SocrataAdapter {
    pub fn new(source: &Source, policy: &RetryPolicy) -> Result<Self, AdapterError> {
        let settings: SocrataSettings = parse_settings(&source.config)?;
        if settings.batch_size == 0 {
            return Err(AdapterError::Config("batchSize must be > 0".into()));
        }
        let client = http_client(Duration::from_millis(settings.timeout))?;
        let app_token = std::env::var("SOCRATA_APP_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());
        Ok(Self {
            endpoint: source.endpoint.clone(),
            policy: policy.clone().with_attempts(settings.retry_attempts),
            settings,
            client,
            app_token,
        })
    }

    pub fn with_app_token(mut self, token: impl Into<String>) -> Self {
        self.app_token = Some(token.into());
        self
    }

    pub fn settings(&self) -> &SocrataSettings {
        &self.settings
    }

    /// Query parameters for a page starting at `cursor`.
    fn query_params(&self, cursor: Option<&CursorState>) -> Result<Vec<(&'static str, String)>, AdapterError> {
        let mut order = self.settings.order_by_field.clone();
        let mut params = vec![("$limit", self.settings.batch_size.to_string())];

        match cursor {
            None => {}
            Some(c) if c.kind == CursorKind::Offset => {
                params.push(("$offset", c.as_u64().unwrap_or(0).to_string()));
            }
            Some(c) if c.kind == CursorKind::Timestamp => {
                let field = c
                    .field
                    .clone()
                    .unwrap_or_else(|| self.settings.updated_at_field.clone());
                let Some(watermark) = c.as_str() else {
                    return Err(AdapterError::Config(
                        "timestamp cursor value must be a string".into(),
                    ));
                };
                params.push(("$where", format!("{} > '{}'", field, watermark)));
                if let Some(offset) = c.offset.filter(|o| *o > 0) {
                    params.push(("$offset", offset.to_string()));
                }
                order = field;
            }
            Some(c) => {
                return Err(AdapterError::Config(format!(
                    "Socrata cannot resume from a {:?} cursor",
                    c.kind
                )));
            }
        }

        params.push(("$order", order));
        Ok(params)
    }

    fn external_id(&self, record: &Value) -> String {
        let id = record
            .get(&self.settings.id_field)
            .filter(|v| !v.is_null())
            .or_else(|| record.get("facility_id"));
        format!(
            "{}_{}",
            id_component(id),
            id_component(record.get("inspection_date"))
        )
    }

    /// Cursor for the page after one of `len` rows fetched at `cursor`.
    fn advance(cursor: Option<&CursorState>, len: u64) -> CursorState {
        match cursor {
            Some(c) if c.kind == CursorKind::Timestamp => {
                let mut next = c.clone();
                next.offset = Some(c.offset.unwrap_or(0) + len);
                next
            }
            Some(c) => CursorState::offset(c.as_u64().unwrap_or(0) + len),
            None => CursorState::offset(len),
        }
    }
}

#[async_trait]
impl Adapter for SocrataAdapter {
    fn name(&self) -> &str {
        "socrata"
    }

    async fn fetch(&self, cursor: Option<&CursorState>) -> Result<FetchResult, AdapterError> {
        let params = self.query_params(cursor)?;
        let params = &params;
        let client = &self.client;
        let endpoint = self.endpoint.as_str();
        let token = self.app_token.as_deref();

        let rows: Vec<Value> = (|| async move {
            let mut req = client
                .get(endpoint)
                .query(params)
                .header(ACCEPT, "application/json");
            if let Some(token) = token {
                req = req.header("X-App-Token", token);
            }
            let resp = req.send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(AdapterError::from_status(status, "Socrata API"));
            }
            resp.json::<Vec<Value>>()
                .await
                .map_err(|e| AdapterError::Protocol(format!("Invalid Socrata response: {}", e)))
        })
        .retry(self.policy.backoff())
        .when(AdapterError::is_transient)
        .notify(log_retry)
        .await?;

        let records: Vec<RawPayload> = rows
            .into_iter()
            .map(|row| RawPayload::new(self.external_id(&row), row))
            .collect();

        let len = records.len() as u64;
        debug!(endpoint = %self.endpoint, count = len, "Fetched Socrata page");

        if len == u64::from(self.settings.batch_size) {
            Ok(FetchResult::more(records, Self::advance(cursor, len)))
        } else {
            Ok(FetchResult::last(records))
        }
    }

    fn initial_cursor(&self) -> CursorState {
        CursorState::offset(0)
    }

    fn incremental_cursor(&self, last_sync: Option<DateTime<Utc>>) -> CursorState {
        let since = match last_sync {
            Some(at) => at - chrono::Duration::hours(self.settings.lookback_hours),
            None => Utc::now() - chrono::Duration::hours(self.settings.initial_lookback_hours),
        };
        CursorState::timestamp(
            since.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.settings.updated_at_field.clone(),
        )
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(&self.endpoint)
            .query(&[("$limit", "1")])
            .header(ACCEPT, "application/json")
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use poolwatch_core::models::{AdapterType, Jurisdiction};
    use serde_json::json;

    fn source(config: Value) -> Source {
        Source {
            id: "austin-pools".into(),
            jurisdiction: Jurisdiction {
                id: "austin-tx".into(),
                slug: "austin-tx".into(),
                name: "Austin".into(),
                state: "TX".into(),
            },
            name: "Austin".into(),
            adapter_type: AdapterType::Socrata,
            endpoint: "https://example.test/resource/x.json".into(),
            config,
            requests_per_minute: 60,
            is_active: true,
            cursor: None,
            last_sync_at: None,
            last_sync_status: None,
            last_sync_error: None,
            last_record_count: None,
        }
    }

    fn adapter(config: Value) -> SocrataAdapter {
        SocrataAdapter::new(&source(config), &RetryPolicy::default()).unwrap()
    }

    #[test]
    fn test_defaults() {
        let a = adapter(json!({}));
        assert_eq!(a.settings().updated_at_field, ":updated_at");
        assert_eq!(a.settings().batch_size, 1000);
        assert_eq!(a.policy.attempts, 3);
    }

    #[test]
    fn test_incremental_cursor_looks_back_a_day() {
        let a = adapter(json!({}));
        let last = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();
        let c = a.incremental_cursor(Some(last));
        assert_eq!(c.kind, CursorKind::Timestamp);
        assert_eq!(c.as_str(), Some("2024-03-01T12:00:00.000Z"));
        assert_eq!(c.field.as_deref(), Some(":updated_at"));
    }

    #[test]
    fn test_timestamp_params_page_within_window() {
        let a = adapter(json!({"batchSize": 50}));
        let mut c = CursorState::timestamp("2024-03-01T00:00:00.000Z", ":updated_at");
        c.offset = Some(100);
        let params = a.query_params(Some(&c)).unwrap();
        assert!(params.contains(&("$where", ":updated_at > '2024-03-01T00:00:00.000Z'".into())));
        assert!(params.contains(&("$offset", "100".into())));
        assert!(params.contains(&("$order", ":updated_at".into())));
        assert!(params.contains(&("$limit", "50".into())));
    }

    #[test]
    fn test_advance() {
        assert_eq!(SocrataAdapter::advance(None, 10), CursorState::offset(10));
        assert_eq!(
            SocrataAdapter::advance(Some(&CursorState::offset(10)), 10),
            CursorState::offset(20)
        );
        let ts = CursorState::timestamp("t", "f");
        assert_eq!(SocrataAdapter::advance(Some(&ts), 5).offset, Some(5));
    }

    #[test]
    fn test_external_id_falls_back_to_facility_id() {
        let a = adapter(json!({"idField": "permit"}));
        let row = json!({"facility_id": "F9", "inspection_date": "2024-01-05T00:00:00.000"});
        assert_eq!(a.external_id(&row), "F9_2024-01-05T00:00:00.000");
    }

    #[test]
    fn test_objectid_cursor_rejected() {
        let a = adapter(json!({}));
        assert!(a.query_params(Some(&CursorState::object_id(3))).is_err());
    }
}
