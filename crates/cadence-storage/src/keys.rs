//! Shared key generation for storage backends.
//!
//! Key format: `{kind}/{owner_id}/{random}/{sanitized_filename}`.

use crate::traits::{StorageError, StorageResult};
use cadence_core::models::{sanitize_filename, FileKind};
use uuid::Uuid;

/// Suffix of the local backend's metadata sidecars.
pub const METADATA_SIDECAR_SUFFIX: &str = ".metadata.json";

/// Directory the local backend keeps multipart sessions in.
pub const MULTIPART_DIR: &str = ".multipart";

/// Generate a fresh object key for a new file.
pub fn generate_object_key(kind: FileKind, owner_id: Uuid, original_filename: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        kind.as_str(),
        owner_id,
        Uuid::new_v4().simple(),
        sanitize_filename(original_filename)
    )
}

/// Key for a copy of an existing object, next to a new random segment.
pub fn derive_copy_key(kind: FileKind, owner_id: Uuid, source_key: &str) -> String {
    let name = source_key.rsplit('/').next().unwrap_or(source_key);
    generate_object_key(kind, owner_id, name)
}

/// Key of `key` renamed to `new_name` within the same directory.
pub fn sibling_key(key: &str, new_name: &str) -> String {
    let name = sanitize_filename(new_name);
    match key.rsplit_once('/') {
        Some((dir, _)) => format!("{}/{}", dir, name),
        None => name,
    }
}

/// Reject keys that could escape the storage root or collide with bookkeeping files.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|segment| segment == ".." || segment == ".")
    {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    if key.ends_with(METADATA_SIDECAR_SUFFIX)
        || key.split('/').any(|segment| segment == MULTIPART_DIR)
    {
        return Err(StorageError::InvalidKey(format!(
            "Storage key uses a reserved name: {}",
            key
        )));
    }
    Ok(())
}
