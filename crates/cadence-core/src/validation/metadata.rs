//! Caller-supplied metadata rules.
//!
//! Metadata is an open JSON object, but it ends up as provider object metadata
//! (S3 user metadata, the local sidecar) so keys must stay header-safe and the
//! whole map must stay small.

use crate::error::AppError;

pub const MAX_METADATA_KEY_LENGTH: usize = 128;
/// Serialized JSON length of a single value.
pub const MAX_METADATA_VALUE_LENGTH: usize = 1024;
pub const MAX_USER_METADATA_KEYS: usize = 50;

const RESERVED_PREFIXES: &[&str] = &["x-amz-", "cadence-"];

/// Keys in the provider/system namespace cannot be set by callers.
pub fn is_reserved_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    RESERVED_PREFIXES.iter().any(|p| lower.starts_with(p))
}

pub fn validate_metadata_key(key: &str) -> Result<(), AppError> {
    if key.is_empty() {
        return Err(AppError::InvalidMetadataKey(
            "Metadata key must not be empty".to_string(),
        ));
    }
    if key.len() > MAX_METADATA_KEY_LENGTH {
        return Err(AppError::InvalidMetadataKey(format!(
            "Metadata key '{}' exceeds {} characters",
            key, MAX_METADATA_KEY_LENGTH
        )));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(AppError::InvalidMetadataKey(format!(
            "Metadata key '{}' may only contain letters, digits, '_', '-' and '.'",
            key
        )));
    }
    if is_reserved_key(key) {
        return Err(AppError::InvalidMetadataKey(format!(
            "Metadata key '{}' uses a reserved prefix",
            key
        )));
    }
    Ok(())
}

pub fn validate_metadata_value(key: &str, value: &serde_json::Value) -> Result<(), AppError> {
    let serialized = serde_json::to_string(value)?;
    if serialized.len() > MAX_METADATA_VALUE_LENGTH {
        return Err(AppError::InvalidMetadataValue(format!(
            "Value for '{}' exceeds {} bytes",
            key, MAX_METADATA_VALUE_LENGTH
        )));
    }
    Ok(())
}

/// Validate a whole metadata object, as sent on upload or in a patch.
pub fn validate_user_metadata(metadata: &serde_json::Value) -> Result<(), AppError> {
    let map = match metadata {
        serde_json::Value::Null => return Ok(()),
        serde_json::Value::Object(map) => map,
        _ => {
            return Err(AppError::InvalidMetadataValue(
                "Metadata must be a JSON object".to_string(),
            ))
        }
    };
    if map.len() > MAX_USER_METADATA_KEYS {
        return Err(AppError::MetadataKeyLimitExceeded(format!(
            "At most {} metadata keys are allowed, got {}",
            MAX_USER_METADATA_KEYS,
            map.len()
        )));
    }
    for (key, value) in map {
        validate_metadata_key(key)?;
        validate_metadata_value(key, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_plain_object() {
        let metadata = json!({"isrc": "USRC17607839", "bpm": 120, "tags": ["lofi"]});
        assert!(validate_user_metadata(&metadata).is_ok());
        assert!(validate_user_metadata(&serde_json::Value::Null).is_ok());
    }

    #[test]
    fn test_rejects_bad_keys() {
        assert!(matches!(
            validate_metadata_key("has space"),
            Err(AppError::InvalidMetadataKey(_))
        ));
        assert!(matches!(
            validate_metadata_key("X-Amz-Meta-Owner"),
            Err(AppError::InvalidMetadataKey(_))
        ));
        assert!(validate_metadata_key(&"k".repeat(129)).is_err());
    }

    #[test]
    fn test_rejects_non_object_and_large_maps() {
        assert!(matches!(
            validate_user_metadata(&json!([1, 2])),
            Err(AppError::InvalidMetadataValue(_))
        ));

        let mut map = serde_json::Map::new();
        for i in 0..=MAX_USER_METADATA_KEYS {
            map.insert(format!("k{}", i), json!(i));
        }
        assert!(matches!(
            validate_user_metadata(&serde_json::Value::Object(map)),
            Err(AppError::MetadataKeyLimitExceeded(_))
        ));
    }

    #[test]
    fn test_rejects_oversized_value() {
        let metadata = json!({"notes": "x".repeat(MAX_METADATA_VALUE_LENGTH)});
        assert!(matches!(
            validate_user_metadata(&metadata),
            Err(AppError::InvalidMetadataValue(_))
        ));
    }
}
