//! Content hashing for change detection.
//!
//! A raw payload is canonicalized (object keys sorted at every depth) and
//! hashed with SHA-256. Two payloads that differ only in key order hash the
//! same; any change to a value changes the hash.
//!
//! ```rust
//! use poolwatch_core::hash::hash_payload;
//! use serde_json::json;
//!
//! let a = hash_payload(&json!({"b": 1, "a": {"y": 2, "x": 3}}));
//! let b = hash_payload(&json!({"a": {"x": 3, "y": 2}, "b": 1}));
//! assert_eq!(a, b);
//! assert_eq!(a.len(), 64);
//! ```

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Rebuild `value` with every object's keys in lexicographic order.
///
/// `serde_json` may be compiled with `preserve_order` somewhere in the
/// dependency graph, so ordering is enforced here rather than assumed.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::with_capacity(map.len());
            for k in keys {
                out.insert(k.clone(), canonicalize(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Hex SHA-256 of the canonical JSON encoding of `payload`.
pub fn hash_payload(payload: &Value) -> String {
    let canonical = canonicalize(payload).to_string();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_one_field_change_changes_hash() {
        let p = json!({"facility_id": "F1", "inspection_result": "Pass", "score": "98"});
        let q = json!({"facility_id": "F1", "inspection_result": "Fail", "score": "98"});
        assert_ne!(hash_payload(&p), hash_payload(&q));
    }

    #[test]
    fn test_array_order_is_significant() {
        assert_ne!(
            hash_payload(&json!({"v": ["a", "b"]})),
            hash_payload(&json!({"v": ["b", "a"]}))
        );
    }

    #[test]
    fn test_stable_across_calls() {
        let p = json!({"z": null, "a": [1, {"d": 1, "c": 2}]});
        assert_eq!(hash_payload(&p), hash_payload(&p.clone()));
    }
}
