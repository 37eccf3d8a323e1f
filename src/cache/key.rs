//! Content-addressed cache keys.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Derives a cache key from a payload and its processing options.
///
/// `sha256(payload) : sha256(canonical options JSON)` - the options JSON is
/// canonicalized by sorting object keys, so logically equal option maps
/// produce the same key while different options for identical payloads never
/// collide.
pub fn content_key(payload: &[u8], options: &Value) -> String {
    let payload_hash = hex_sha256(payload);
    let canonical = canonical_json(options);
    let options_hash = hex_sha256(canonical.as_bytes());
    format!("{}:{}", payload_hash, options_hash)
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Serializes JSON with object keys in sorted order.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let body: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(k).unwrap_or_default(),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_shape() {
        let key = content_key(b"payload", &json!({}));
        let parts: Vec<&str> = key.split(':').collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 64);
        assert_eq!(parts[1].len(), 64);
    }

    #[test]
    fn test_key_option_order_is_irrelevant() {
        let a = content_key(b"img", &json!({"lang": "en", "quality": "high"}));
        let b = content_key(b"img", &json!({"quality": "high", "lang": "en"}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_options_never_collide() {
        let a = content_key(b"img", &json!({"lang": "en"}));
        let b = content_key(b"img", &json!({"lang": "zh"}));
        assert_ne!(a, b);
        // Payload hash half stays the same
        assert_eq!(a.split(':').next(), b.split(':').next());
    }

    #[test]
    fn test_different_payloads_never_collide() {
        let a = content_key(b"img-1", &json!({}));
        let b = content_key(b"img-2", &json!({}));
        assert_ne!(a, b);
    }

    #[test]
    fn test_nested_options_canonicalized() {
        let a = content_key(b"x", &json!({"outer": {"b": 2, "a": 1}}));
        let b = content_key(b"x", &json!({"outer": {"a": 1, "b": 2}}));
        assert_eq!(a, b);
    }
}
