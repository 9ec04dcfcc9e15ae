//! Canonical input representation and cache key derivation
//!
//! A stage's cache key is the SHA-256 of its name plus the canonical JSON of
//! its input. Canonicalization is total and stable: object keys are emitted
//! in sorted order, arrays of scalars are treated as sets and sorted, floats
//! are clamped to fixed precision, and non-semantic metadata (timestamps,
//! request ids, nonces) is stripped. Identical semantic content must always
//! hash identically.

use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

/// Keys that never participate in cache identity
const VOLATILE_KEYS: &[&str] = &[
    "timestamp",
    "created_at",
    "request_id",
    "trace_id",
    "nonce",
    "elapsed_ms",
];

/// Fractional digits preserved for floats inside canonical inputs
const FLOAT_PRECISION: f64 = 1e6;

/// Produce the canonical form of a JSON value
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map
                .keys()
                .filter(|k| !VOLATILE_KEYS.contains(&k.as_str()))
                .collect();
            keys.sort();

            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let mut canonical: Vec<Value> = items.iter().map(canonicalize).collect();
            // Scalar arrays carry set semantics; arrays of composites keep
            // their order (assumed semantically ordered).
            if canonical.iter().all(is_scalar) {
                canonical.sort_by(|a, b| scalar_sort_key(a).cmp(&scalar_sort_key(b)));
            }
            Value::Array(canonical)
        }
        Value::Number(n) => Value::Number(round_number(n)),
        other => other.clone(),
    }
}

/// Canonical JSON text of a value
pub fn canonical_string(value: &Value) -> String {
    serde_json::to_string(&canonicalize(value))
        .expect("JSON value serialization cannot fail")
}

/// Content-addressed cache key for (stage, canonical input)
pub fn cache_key(stage: &str, canonical_input: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stage.as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_string(canonical_input).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Round a score to 4 fractional digits (fixed-precision numerics for
/// anything that feeds a cache key or a composite score)
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

fn scalar_sort_key(value: &Value) -> String {
    serde_json::to_string(value).expect("JSON value serialization cannot fail")
}

fn round_number(n: &Number) -> Number {
    if let Some(f) = n.as_f64() {
        if n.is_f64() {
            let rounded = (f * FLOAT_PRECISION).round() / FLOAT_PRECISION;
            // from_f64 only fails on NaN/infinity, which serde_json::Value
            // cannot hold in the first place
            return Number::from_f64(rounded).unwrap_or_else(|| n.clone());
        }
    }
    n.clone()
}
