//! Content-addressed hashing.
//!
//! Everything is SHA-256, hex encoded. Hashing a structured value first
//! serializes it to compact JSON; if that fails the caller gets a
//! placeholder reference and a warning instead of an error.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Prefix of placeholder references.
pub const PLACEHOLDER_PREFIX: &str = "placeholder-";

/// SHA-256 hex digest of `content`.
pub fn content_hash(content: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_ref());
    hex::encode(hasher.finalize())
}

/// A hash, or a placeholder when hashing was not possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HashReference {
    /// Hex digest or placeholder id
    pub hash: String,
    /// True when `hash` is a placeholder
    pub placeholder: bool,
}

impl HashReference {
    /// Reference to the digest of `content`.
    pub fn of(content: impl AsRef<[u8]>) -> Self {
        Self {
            hash: content_hash(content),
            placeholder: false,
        }
    }

    /// Placeholder reference with a fresh random id.
    pub fn placeholder() -> Self {
        Self {
            hash: format!("{PLACEHOLDER_PREFIX}{}", uuid::Uuid::new_v4()),
            placeholder: true,
        }
    }
}

/// Hash a structured value through its compact JSON form.
pub fn value_hash(value: &Value) -> HashReference {
    hash_serialized(value)
}

/// Hash any serializable value through its compact JSON form.
pub fn hash_serialized<T: Serialize + ?Sized>(value: &T) -> HashReference {
    match serde_json::to_vec(value) {
        Ok(bytes) => HashReference::of(bytes),
        Err(e) => {
            tracing::warn!("Hash generation failed, using placeholder reference: {e}");
            HashReference::placeholder()
        },
    }
}
