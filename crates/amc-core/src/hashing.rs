use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashingError {
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Renders `value` as JSON with every object's keys sorted, so that two
/// semantically-equal payloads with differently-ordered fields hash the same.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, HashingError> {
    let json = serde_json::to_value(value).map_err(|err| HashingError::Serialization(err.to_string()))?;
    let canonical = canonicalize_value(json);
    serde_json::to_string(&canonical).map_err(|err| HashingError::Serialization(err.to_string()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut output = String::with_capacity(digest.len() * 2);
    for byte in digest {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

/// Hash of a value's canonical JSON form. Used to detect duplicate event
/// ingestion: same caller, same session/actor/kind/content, same hash.
pub fn canonical_payload_hash<T: Serialize>(value: &T) -> Result<String, HashingError> {
    let rendered = canonical_json(value)?;
    Ok(sha256_hex(rendered.as_bytes()))
}

fn canonicalize_value(value: Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut entries: Vec<(String, Value)> = object.into_iter().collect();
            entries.sort_by(|left, right| left.0.cmp(&right.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, canonicalize_value(value));
            }
            Value::Object(sorted)
        }
        Value::Array(values) => Value::Array(values.into_iter().map(canonicalize_value).collect()),
        scalar => scalar,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let payload = serde_json::json!({"z": 1, "a": {"b": 2, "a": 1}});
        let rendered = canonical_json(&payload).expect("canonical json");
        assert_eq!(rendered, r#"{"a":{"a":1,"b":2},"z":1}"#);
    }

    #[test]
    fn hash_is_stable_across_field_order() {
        let a = serde_json::json!({"kind": "message", "text": "hi"});
        let b = serde_json::json!({"text": "hi", "kind": "message"});
        assert_eq!(
            canonical_payload_hash(&a).expect("hash a"),
            canonical_payload_hash(&b).expect("hash b")
        );
    }
}
