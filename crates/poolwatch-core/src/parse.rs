//! Lenient field parsing for heterogeneous upstream payloads.
//!
//! Sources disagree on almost everything: dates arrive as ISO strings,
//! floating timestamps without a zone, epoch seconds or milliseconds, or
//! `MM/DD/YYYY` text buried in a sentence. These helpers return `None`
//! instead of guessing; transformers decide whether a missing value is
//! fatal for the record.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;

static US_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})[/-](\d{1,2})[/-](\d{4})").unwrap());

/// Epoch values above this are milliseconds.
const MILLIS_THRESHOLD: f64 = 1e12;

/// Parse a date out of a JSON value.
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS[.fff]` floating timestamps,
/// `YYYY-MM-DD`, `MM/DD/YYYY`, `MM-DD-YYYY`, and epoch numbers (seconds or
/// milliseconds).
///
/// ```rust
/// use poolwatch_core::parse::parse_date;
/// use serde_json::json;
///
/// let d = parse_date(&json!("2024-06-03T00:00:00.000")).unwrap();
/// assert_eq!(d.to_string(), "2024-06-03");
/// assert_eq!(parse_date(&json!(1717372800000_i64)), Some(d));
/// assert_eq!(parse_date(&json!("06/03/2024")), Some(d));
/// assert_eq!(parse_date(&json!("soon")), None);
/// ```
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => parse_date_str(s),
        Value::Number(n) => n.as_f64().and_then(date_from_epoch),
        _ => None,
    }
}

/// String form of [`parse_date`].
pub fn parse_date_str(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    if let Ok(n) = s.parse::<f64>() {
        return date_from_epoch(n);
    }
    None
}

/// Pull the first `M/D/YYYY` (or `M-D-YYYY`) date out of free text.
///
/// ```rust
/// use poolwatch_core::parse::extract_us_date;
/// let d = extract_us_date("Date: 7/04/2023  Routine").unwrap();
/// assert_eq!(d.to_string(), "2023-07-04");
/// ```
pub fn extract_us_date(text: &str) -> Option<NaiveDate> {
    let caps = US_DATE.captures(text)?;
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Interpret an epoch number as seconds or milliseconds.
pub fn date_from_epoch(n: f64) -> Option<NaiveDate> {
    if !n.is_finite() || n <= 0.0 {
        return None;
    }
    let millis = if n > MILLIS_THRESHOLD { n } else { n * 1000.0 };
    DateTime::from_timestamp_millis(millis as i64).map(|dt| dt.date_naive())
}

/// Parse a number out of a JSON number or numeric string.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Non-empty trimmed text for `key`, stringifying numbers and booleans.
pub fn text(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_epoch_seconds_and_millis_agree() {
        assert_eq!(parse_date(&json!(1_700_000_000)), parse_date(&json!(1_700_000_000_000_i64)));
    }

    #[test]
    fn test_rfc3339_with_offset() {
        let d = parse_date(&json!("2023-12-31T23:30:00-06:00")).unwrap();
        assert_eq!(d.to_string(), "2023-12-31");
    }

    #[test]
    fn test_dashed_us_date() {
        assert_eq!(
            parse_date(&json!("03-15-2022")),
            NaiveDate::from_ymd_opt(2022, 3, 15)
        );
    }

    #[test]
    fn test_rejects_impossible_dates() {
        assert_eq!(parse_date(&json!("02/30/2022")), None);
        assert_eq!(extract_us_date("on 13/01/2022"), None);
        assert_eq!(parse_date(&json!(null)), None);
        assert_eq!(parse_date(&json!("")), None);
    }

    #[test]
    fn test_parse_number_variants() {
        assert_eq!(parse_number(&json!("  30.25 ")), Some(30.25));
        assert_eq!(parse_number(&json!(-97)), Some(-97.0));
        assert_eq!(parse_number(&json!("n/a")), None);
        assert_eq!(parse_number(&json!(true)), None);
    }

    #[test]
    fn test_text_helper() {
        let d = json!({"a": "  x ", "b": "", "c": 12, "d": null});
        assert_eq!(text(&d, "a").as_deref(), Some("x"));
        assert_eq!(text(&d, "b"), None);
        assert_eq!(text(&d, "c").as_deref(), Some("12"));
        assert_eq!(text(&d, "d"), None);
        assert_eq!(text(&d, "missing"), None);
    }
}
