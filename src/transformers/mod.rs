//! Per-jurisdiction mapping from raw payloads to canonical records.
//!
//! A [`Transformer`] is pure: no I/O, no retries. It fails with a
//! [`TransformError`] when a mandatory field (the inspection date, in
//! practice) is missing or unparseable; the orchestrator counts that
//! record as failed and moves on.
//!
//! Transformers are looked up by jurisdiction slug in the
//! [`Registry`](crate::registry::Registry).

pub mod arlington;
pub mod austin;
pub mod houston;

use serde_json::Value;

use poolwatch_core::models::{CanonicalRecord, RawPayload, Source};
use poolwatch_core::parse;

use crate::error::TransformError;

pub use arlington::ArlingtonTransformer;
pub use austin::AustinTransformer;
pub use houston::HoustonTransformer;

pub trait Transformer: Send + Sync {
    fn transform(&self, raw: &RawPayload, source: &Source) -> Result<CanonicalRecord, TransformError>;
}

impl<F> Transformer for F
where
    F: Fn(&RawPayload, &Source) -> Result<CanonicalRecord, TransformError> + Send + Sync,
{
    fn transform(&self, raw: &RawPayload, source: &Source) -> Result<CanonicalRecord, TransformError> {
        self(raw, source)
    }
}

/// Trimmed text of `key`, or `default` when absent or blank.
pub(crate) fn text_or(data: &Value, key: &str, default: &str) -> String {
    parse::text(data, key).unwrap_or_else(|| default.to_string())
}

/// Describe a raw field value for error messages.
pub(crate) fn describe(value: Option<&Value>) -> String {
    match value {
        None => "<missing>".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
    }
}

#[cfg(test)]
pub(crate) fn test_source(jurisdiction: &str) -> Source {
    use poolwatch_core::models::{AdapterType, Jurisdiction};
    Source {
        id: format!("{}-pools", jurisdiction),
        jurisdiction: Jurisdiction {
            id: jurisdiction.to_string(),
            slug: jurisdiction.to_string(),
            name: jurisdiction.to_string(),
            state: "TX".to_string(),
        },
        name: jurisdiction.to_string(),
        adapter_type: AdapterType::Socrata,
        endpoint: String::new(),
        config: Value::Object(Default::default()),
        requests_per_minute: 60,
        is_active: true,
        cursor: None,
        last_sync_at: None,
        last_sync_status: None,
        last_sync_error: None,
        last_record_count: None,
    }
}
