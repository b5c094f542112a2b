//! Error types for the ingestion engine.
//!
//! Adapter and transform failures are typed so the orchestrator can tell
//! a batch-fatal network problem from a single malformed record. Storage
//! keeps `anyhow` since callers only ever propagate it.

use thiserror::Error;

/// Failure while talking to an upstream source.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Timeouts, resets, HTTP 429 and 5xx. Worth retrying.
    #[error("transient error: {0}")]
    Transient(String),

    /// Non-retryable HTTP status or an explicit error payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The source's config blob cannot drive this adapter.
    #[error("configuration error: {0}")]
    Config(String),
}

impl AdapterError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Transient(_))
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: reqwest::StatusCode, context: &str) -> Self {
        if status.as_u16() == 429 || status.is_server_error() {
            AdapterError::Transient(format!("{} returned {}", context, status))
        } else {
            AdapterError::Protocol(format!("{} returned {}", context, status))
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return AdapterError::from_status(status, "request");
        }
        if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            AdapterError::Transient(e.to_string())
        } else {
            AdapterError::Protocol(e.to_string())
        }
    }
}

/// A record that cannot be mapped to the canonical shape.
#[derive(Error, Debug, PartialEq)]
pub enum TransformError {
    #[error("missing field '{0}'")]
    MissingField(String),

    #[error("invalid date in '{field}': {value}")]
    InvalidDate { field: String, value: String },

    #[error("invalid value in '{field}': {value}")]
    InvalidValue { field: String, value: String },
}

/// Anything that stops a run before or outside per-record processing.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("source not found: {0}")]
    SourceNotFound(String),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("{0}")]
    Registry(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_classification() {
        assert!(AdapterError::from_status(StatusCode::TOO_MANY_REQUESTS, "x").is_transient());
        assert!(AdapterError::from_status(StatusCode::BAD_GATEWAY, "x").is_transient());
        assert!(!AdapterError::from_status(StatusCode::NOT_FOUND, "x").is_transient());
        assert!(!AdapterError::Config("x".into()).is_transient());
    }

    #[test]
    fn test_messages() {
        let e = TransformError::InvalidDate {
            field: "inspection_date".into(),
            value: "soon".into(),
        };
        assert_eq!(e.to_string(), "invalid date in 'inspection_date': soon");
        let e = IngestError::from(AdapterError::Protocol("bad".into()));
        assert_eq!(e.to_string(), "protocol error: bad");
    }
}
