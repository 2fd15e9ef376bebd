//! Change detection for collector output.
//!
//! The fingerprint is a SHA-256 over a canonical JSON rendering: object keys
//! are sorted at every level, arrays keep their order.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Deterministic, key-order-independent hash of `value` (lowercase hex).
pub fn fingerprint(value: &Value) -> String {
    let canonical = canonicalize(value);
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Rebuild `value` with every object's keys inserted in sorted order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (key, v) in entries {
                sorted.insert(key.clone(), canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Structurally empty: null, false, zero, "", [], or an object whose values
/// are all structurally empty.
pub fn is_empty_data(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.values().all(is_empty_data),
    }
}
