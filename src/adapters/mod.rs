//! Source adapters: the fetch/cursor contract and its built-in variants.
//!
//! Every external provider is reached through one [`Adapter`] trait. The
//! orchestrator never interprets a cursor; it asks the adapter for a
//! starting position, hands each returned `next_cursor` back on the next
//! call, and persists it in between.
//!
//! # Variants
//!
//! | Adapter | Protocol | Cursor | Incremental strategy |
//! |---------|----------|--------|----------------------|
//! | [`SocrataAdapter`] | paginated REST (SODA) | `offset`, then `timestamp` | watermark with look-back overlap |
//! | [`ArcgisAdapter`] | feature server query | `objectid` | full rescan |
//! | [`HoustonScraper`] | browser-scraped portal | encoded `{start, facilityIndex}` | full rescan |
//!
//! # Restartability
//!
//! A failed `fetch` is retried whole by the caller. Adapters never resume
//! from partial in-page progress, so any cursor they return must describe
//! a position at which a fresh fetch can start.

pub mod arcgis;
pub mod scraper;
pub mod socrata;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use poolwatch_core::cursor::CursorState;
use poolwatch_core::models::FetchResult;

use crate::error::AdapterError;

pub use arcgis::ArcgisAdapter;
pub use self::scraper::houston::HoustonScraper;
pub use socrata::SocrataAdapter;

/// Timeout for health-check probes.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-source fetch implementation.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use chrono::{DateTime, Utc};
/// use poolwatch::adapters::Adapter;
/// use poolwatch::error::AdapterError;
/// use poolwatch_core::cursor::CursorState;
/// use poolwatch_core::models::{FetchResult, RawPayload};
/// use serde_json::json;
///
/// struct Fixed;
///
/// #[async_trait]
/// impl Adapter for Fixed {
///     fn name(&self) -> &str { "fixed" }
///
///     async fn fetch(&self, _cursor: Option<&CursorState>) -> Result<FetchResult, AdapterError> {
///         Ok(FetchResult::last(vec![RawPayload::new("1", json!({"id": 1}))]))
///     }
///
///     fn initial_cursor(&self) -> CursorState { CursorState::offset(0) }
///
///     fn incremental_cursor(&self, _last_sync: Option<DateTime<Utc>>) -> CursorState {
///         CursorState::offset(0)
///     }
///
///     async fn health_check(&self) -> bool { true }
/// }
/// ```
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Short identifier used in logs (e.g. `"socrata"`).
    fn name(&self) -> &str;

    /// Fetch one batch starting at `cursor`.
    ///
    /// `None` means "from the beginning", equivalent to
    /// [`initial_cursor`](Adapter::initial_cursor).
    async fn fetch(&self, cursor: Option<&CursorState>) -> Result<FetchResult, AdapterError>;

    /// Starting position for a backfill.
    fn initial_cursor(&self) -> CursorState;

    /// Starting position for an incremental run. Each adapter picks its own
    /// look-back overlap; duplicates are absorbed by deduplication.
    fn incremental_cursor(&self, last_sync: Option<DateTime<Utc>>) -> CursorState;

    /// Whether the source is reachable. Never errors.
    async fn health_check(&self) -> bool;
}

/// Deserialize an adapter's settings from the source's JSON config blob.
///
/// `null` is treated as an empty object so every field falls back to its
/// serde default.
pub fn parse_settings<T: DeserializeOwned>(config: &Value) -> Result<T, AdapterError> {
    let value = if config.is_null() {
        Value::Object(Default::default())
    } else {
        config.clone()
    };
    serde_json::from_value(value).map_err(|e| AdapterError::Config(e.to_string()))
}

/// Shared HTTP client builder.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, AdapterError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("poolwatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AdapterError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Render a JSON scalar for use in an external id.
pub(crate) fn id_component(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
