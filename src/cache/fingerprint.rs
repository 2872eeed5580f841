//! Deterministic cache keys.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize `value` with object keys sorted at every depth.
///
/// Two values that differ only in key order produce the same string.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// SHA-256 (hex) over tenant, process and the canonical input.
///
/// Identifiers are length-prefixed so `("ab", "c")` and `("a", "bc")` hash
/// differently.
///
/// # Example
///
/// ```
/// use intelligence_pipeline::cache::compute_fingerprint;
/// use serde_json::json;
///
/// let a = compute_fingerprint("t1", "p1", &json!({"x": 1, "y": 2}));
/// let b = compute_fingerprint("t1", "p1", &json!({"y": 2, "x": 1}));
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
pub fn compute_fingerprint(tenant_id: &str, process_id: &str, input: &Value) -> String {
    let mut hasher = Sha256::new();
    for part in [tenant_id, process_id] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hasher.update(canonical_json(input).as_bytes());
    hex::encode(hasher.finalize())
}
