//! Idempotency key derivation
//!
//! Keys are a SHA-256 over the destination, operation, stable resource id and
//! a canonical rendering of the payload. Two callers enqueueing the same
//! logical change produce the same key regardless of JSON object key order,
//! so the unique index on `idempotency_key` collapses them into one item.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Render a JSON value with all object keys sorted, recursively.
///
/// Array order is preserved; it is meaningful for payloads like ordered
/// spreadsheet rows.
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<(&String, &Value)> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::with_capacity(sorted.len());
            for (key, inner) in sorted {
                out.insert(key.clone(), canonicalize(inner));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Derive the idempotency key for an enqueue request.
pub fn idempotency_key(
    destination_id: &str,
    operation: &str,
    stable_resource_id: &str,
    payload: &Value,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(destination_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(operation.as_bytes());
    hasher.update(b"\n");
    hasher.update(stable_resource_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_json(payload).as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"z": true, "m": null}});
        assert_eq!(canonical_json(&value), r#"{"a":{"m":null,"z":true},"b":1}"#);
    }

    #[test]
    fn canonical_json_preserves_array_order() {
        let value = json!({"rows": [3, 1, 2]});
        assert_eq!(canonical_json(&value), r#"{"rows":[3,1,2]}"#);
    }

    #[test]
    fn key_is_stable_across_key_order() {
        let a = json!({"name": "Ada", "email": "ada@example.com"});
        let b = json!({"email": "ada@example.com", "name": "Ada"});

        let key_a = idempotency_key("slack", "post_message", "lead-42", &a);
        let key_b = idempotency_key("slack", "post_message", "lead-42", &b);
        assert_eq!(key_a, key_b);
        assert_eq!(key_a.len(), 64);
    }

    #[test]
    fn key_changes_with_any_component() {
        let payload = json!({"x": 1});
        let base = idempotency_key("slack", "post_message", "lead-42", &payload);

        assert_ne!(base, idempotency_key("notion", "post_message", "lead-42", &payload));
        assert_ne!(base, idempotency_key("slack", "update_message", "lead-42", &payload));
        assert_ne!(base, idempotency_key("slack", "post_message", "lead-43", &payload));
        assert_ne!(base, idempotency_key("slack", "post_message", "lead-42", &json!({"x": 2})));
    }

    #[test]
    fn delimiter_prevents_component_bleed() {
        // "ab" + "c" must not collide with "a" + "bc".
        let payload = json!({});
        let one = idempotency_key("ab", "c", "r", &payload);
        let two = idempotency_key("a", "bc", "r", &payload);
        assert_ne!(one, two);
    }
}
