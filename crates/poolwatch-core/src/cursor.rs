//! Resumable pagination cursors.
//!
//! A [`CursorState`] is the only pagination state the orchestrator sees.
//! It is persisted after every batch and handed back to the adapter that
//! produced it; nothing outside the adapter interprets `value`.
//!
//! Three shapes are used in practice:
//!
//! | Kind | `value` | `field` | Used by |
//! |------|---------|---------|---------|
//! | `offset` | row counter, or adapter JSON encoded as a string | - | paginated APIs, browser scrapers |
//! | `timestamp` | RFC 3339 watermark | updated-at column | incremental API sync |
//! | `objectid` | last primary key seen | - | feature servers |
//!
//! Browser-driven adapters need more than one scalar (outer page plus inner
//! item index), so they serialize their own struct into `value` with
//! [`CursorState::encode`] and read it back with [`CursorState::decode`].
//!
//! ```rust
//! use poolwatch_core::cursor::{CursorKind, CursorState};
//!
//! let c = CursorState::offset(1000);
//! assert_eq!(c.kind, CursorKind::Offset);
//! assert_eq!(c.as_u64(), Some(1000));
//!
//! let json = serde_json::to_string(&c).unwrap();
//! assert_eq!(json, r#"{"type":"offset","value":1000}"#);
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tag of a [`CursorState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CursorKind {
    #[serde(rename = "offset")]
    Offset,
    #[serde(rename = "timestamp")]
    Timestamp,
    #[serde(rename = "objectid")]
    ObjectId,
}

/// Serializable pagination position.
///
/// `offset` is only meaningful for `timestamp` cursors: it pages through
/// rows that share the same watermark filter, so a bulk update that stamps
/// thousands of rows with one `updated_at` value is never truncated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorState {
    #[serde(rename = "type")]
    pub kind: CursorKind,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl CursorState {
    pub fn offset(value: u64) -> Self {
        Self {
            kind: CursorKind::Offset,
            value: Value::from(value),
            field: None,
            offset: None,
        }
    }

    pub fn timestamp(value: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            kind: CursorKind::Timestamp,
            value: Value::String(value.into()),
            field: Some(field.into()),
            offset: None,
        }
    }

    pub fn object_id(value: i64) -> Self {
        Self {
            kind: CursorKind::ObjectId,
            value: Value::from(value),
            field: None,
            offset: None,
        }
    }

    /// Build an `offset` cursor whose value is `state` serialized as a JSON string.
    pub fn encode<T: Serialize>(state: &T) -> serde_json::Result<Self> {
        Ok(Self {
            kind: CursorKind::Offset,
            value: Value::String(serde_json::to_string(state)?),
            field: None,
            offset: None,
        })
    }

    /// Inverse of [`encode`](Self::encode). Returns `None` for any cursor
    /// that was not produced by `encode` with a compatible type.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        if self.kind != CursorKind::Offset {
            return None;
        }
        match &self.value {
            Value::String(s) => serde_json::from_str(s).ok(),
            _ => None,
        }
    }

    /// Numeric value, accepting both JSON numbers and numeric strings.
    pub fn as_u64(&self) -> Option<u64> {
        match &self.value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match &self.value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct PageState {
        start: u32,
        item: u32,
    }

    #[test]
    fn test_timestamp_cursor_shape() {
        let c = CursorState::timestamp("2024-01-01T00:00:00Z", ":updated_at");
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["type"], "timestamp");
        assert_eq!(v["field"], ":updated_at");
        assert!(v.get("offset").is_none());
    }

    #[test]
    fn test_objectid_tag_spelling() {
        let c: CursorState = serde_json::from_str(r#"{"type":"objectid","value":42}"#).unwrap();
        assert_eq!(c.kind, CursorKind::ObjectId);
        assert_eq!(c.as_i64(), Some(42));
    }

    #[test]
    fn test_encoded_state_survives_persistence() {
        let c = CursorState::encode(&PageState { start: 11, item: 3 }).unwrap();
        let stored = serde_json::to_string(&c).unwrap();
        let restored: CursorState = serde_json::from_str(&stored).unwrap();
        assert_eq!(
            restored.decode::<PageState>(),
            Some(PageState { start: 11, item: 3 })
        );
    }

    #[test]
    fn test_decode_rejects_plain_offsets() {
        assert_eq!(CursorState::offset(5).decode::<PageState>(), None);
    }

    #[test]
    fn test_numeric_string_values() {
        let c: CursorState = serde_json::from_str(r#"{"type":"offset","value":"250"}"#).unwrap();
        assert_eq!(c.as_u64(), Some(250));
    }
}
