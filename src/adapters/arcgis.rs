//! ArcGIS feature-server adapter.
//!
//! Pages by object id: each query asks for rows with
//! `(<whereClause>) AND <objectIdField> > <last seen id>` ordered by the id
//! field. Feature servers expose no reliable updated-at column, so
//! incremental runs rescan the whole id range and rely on deduplication to
//! skip unchanged rows.
//!
//! Feature geometry, when present, is merged into the attributes as
//! `_geometry_x` / `_geometry_y` so transformers see a flat record.

use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use poolwatch_core::cursor::{CursorKind, CursorState};
use poolwatch_core::models::{FetchResult, RawPayload, Source};

use super::{http_client, id_component, parse_settings, Adapter, HEALTH_CHECK_TIMEOUT};
use crate::error::AdapterError;
use crate::retry::{log_retry, RetryPolicy};

/// Feature servers cap a single query at this many rows.
const MAX_BATCH_SIZE: u32 = 1000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcgisSettings {
    #[serde(default = "default_object_id_field")]
    pub object_id_field: String,
    #[serde(default)]
    pub where_clause: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

fn default_object_id_field() -> String {
    "OBJECTID".to_string()
}
fn default_batch_size() -> u32 {
    MAX_BATCH_SIZE
}
fn default_timeout() -> u64 {
    30_000
}
fn default_retry_attempts() -> u32 {
    3
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    features: Vec<Feature>,
    #[serde(default)]
    exceeded_transfer_limit: bool,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    attributes: Map<String, Value>,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    x: Option<f64>,
    y: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

pub struct ArcgisAdapter {
    query_url: String,
    service_url: String,
    settings: ArcgisSettings,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl ArcgisAdapter {
    pub fn new(source: &Source, policy: &RetryPolicy) -> Result<Self, AdapterError> {
        let mut settings: ArcgisSettings = parse_settings(&source.config)?;
        if settings.batch_size == 0 {
            return Err(AdapterError::Config("batchSize must be > 0".into()));
        }
        settings.batch_size = settings.batch_size.min(MAX_BATCH_SIZE);
        let client = http_client(Duration::from_millis(settings.timeout))?;
        let (query_url, service_url) = split_endpoint(&source.endpoint);
        Ok(Self {
            query_url,
            service_url,
            policy: policy.clone().with_attempts(settings.retry_attempts),
            settings,
            client,
        })
    }

    pub fn settings(&self) -> &ArcgisSettings {
        &self.settings
    }

    fn where_clause(&self, cursor: Option<&CursorState>) -> Result<String, AdapterError> {
        let base = self.settings.where_clause.as_deref().unwrap_or("1=1");
        match cursor {
            None => Ok(base.to_string()),
            Some(c) if c.kind == CursorKind::ObjectId => {
                let Some(oid) = c.as_i64() else {
                    return Err(AdapterError::Config("objectid cursor must be an integer".into()));
                };
                Ok(format!(
                    "({}) AND {} > {}",
                    base, self.settings.object_id_field, oid
                ))
            }
            Some(c) => Err(AdapterError::Config(format!(
                "ArcGIS cannot resume from a {:?} cursor",
                c.kind
            ))),
        }
    }

    fn to_payload(&self, feature: Feature) -> RawPayload {
        let mut data = feature.attributes;
        if let Some(geometry) = feature.geometry {
            data.insert("_geometry_x".into(), geometry.x.map_or(Value::Null, Value::from));
            data.insert("_geometry_y".into(), geometry.y.map_or(Value::Null, Value::from));
        }
        let external_id = id_component(data.get(&self.settings.object_id_field));
        RawPayload::new(external_id, Value::Object(data))
    }
}

/// `(query endpoint, service endpoint)` for a configured URL with or
/// without the trailing `/query`.
fn split_endpoint(endpoint: &str) -> (String, String) {
    let trimmed = endpoint.trim_end_matches('/');
    match trimmed.strip_suffix("/query") {
        Some(service) => (trimmed.to_string(), service.to_string()),
        None => (format!("{}/query", trimmed), trimmed.to_string()),
    }
}

#[async_trait]
impl Adapter for ArcgisAdapter {
    fn name(&self) -> &str {
        "arcgis"
    }

    async fn fetch(&self, cursor: Option<&CursorState>) -> Result<FetchResult, AdapterError> {
        let params = [
            ("where", self.where_clause(cursor)?),
            ("outFields", "*".to_string()),
            ("f", "json".to_string()),
            ("resultRecordCount", self.settings.batch_size.to_string()),
            ("orderByFields", self.settings.object_id_field.clone()),
            ("returnGeometry", "true".to_string()),
        ];
        let params = &params;
        let client = &self.client;
        let url = self.query_url.as_str();

        let body: QueryResponse = (|| async move {
            let resp = client.get(url).query(params).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(AdapterError::from_status(status, "ArcGIS API"));
            }
            resp.json::<QueryResponse>()
                .await
                .map_err(|e| AdapterError::Protocol(format!("Invalid ArcGIS response: {}", e)))
        })
        .retry(self.policy.backoff())
        .when(AdapterError::is_transient)
        .notify(log_retry)
        .await?;

        if let Some(err) = body.error {
            return Err(AdapterError::Protocol(match err.code {
                Some(code) => format!("ArcGIS API error {}: {}", code, err.message),
                None => format!("ArcGIS API error: {}", err.message),
            }));
        }

        let exceeded = body.exceeded_transfer_limit;
        let records: Vec<RawPayload> = body
            .features
            .into_iter()
            .map(|f| self.to_payload(f))
            .collect();
        debug!(url = %self.query_url, count = records.len(), exceeded, "Fetched ArcGIS page");

        let full_page = records.len() == self.settings.batch_size as usize;
        let last_oid = records
            .last()
            .and_then(|r| r.data.get(&self.settings.object_id_field))
            .and_then(Value::as_i64);

        match last_oid {
            Some(oid) if exceeded || full_page => {
                Ok(FetchResult::more(records, CursorState::object_id(oid)))
            }
            _ => Ok(FetchResult::last(records)),
        }
    }

    fn initial_cursor(&self) -> CursorState {
        CursorState::object_id(0)
    }

    fn incremental_cursor(&self, _last_sync: Option<DateTime<Utc>>) -> CursorState {
        // No trustworthy change column; rescan everything.
        CursorState::object_id(0)
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(&self.service_url)
            .query(&[("f", "json")])
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
