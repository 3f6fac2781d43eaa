use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use study_core::errors::{ErrorInfo, StudyError};

fn serde_error(code: &str, err: impl ToString) -> StudyError {
    StudyError::Serde(ErrorInfo::new(code, err.to_string()))
}

// Object keys sorted at every depth; arrays keep their order.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        leaf => leaf,
    }
}

/// Canonical JSON: compact, object keys sorted.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, StudyError> {
    let value = serde_json::to_value(value).map_err(|err| serde_error("json_serialize", err))?;
    serde_json::to_vec(&sort_keys(value)).map_err(|err| serde_error("json_write", err))
}

/// Hex SHA-256 of the canonical JSON of `value`.
///
/// Plan hashes and artifact shape keys both go through here, so two values
/// hash equal exactly when their canonical JSON is equal.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, StudyError> {
    let digest = Sha256::digest(to_canonical_json_bytes(value)?);
    Ok(format!("{digest:x}"))
}

/// Parses JSON bytes.
pub fn from_json_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, StudyError> {
    serde_json::from_slice(data).map_err(|err| serde_error("json_deserialize", err))
}

/// Renders YAML, the format of study and job files.
pub fn to_yaml_string<T: Serialize>(value: &T) -> Result<String, StudyError> {
    serde_yaml::to_string(value).map_err(|err| serde_error("yaml_serialize", err))
}

/// Parses YAML bytes.
pub fn from_yaml_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, StudyError> {
    serde_yaml::from_slice(data).map_err(|err| serde_error("yaml_deserialize", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_change_the_hash() {
        let a = json!({"b": 1, "a": {"y": [1, 2], "x": 0.1}});
        let b = json!({"a": {"x": 0.1, "y": [1, 2]}, "b": 1});
        assert_eq!(to_canonical_json_bytes(&a).expect("a"), to_canonical_json_bytes(&b).expect("b"));
        assert_eq!(stable_hash_string(&a).expect("a"), stable_hash_string(&b).expect("b"));
        assert_ne!(
            stable_hash_string(&json!({"a": [1, 2]})).expect("c"),
            stable_hash_string(&json!({"a": [2, 1]})).expect("d")
        );
    }
}
