//! Content hashing helpers.

use sha2::{Digest, Sha256};

/// sha256 of a byte payload, hex encoded. The dedup key for uploads.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// sha256 of a text span, hex encoded. Used for chunk identity and the
/// embedding cache.
#[must_use]
pub fn text_hash(text: &str) -> String {
    content_hash(text.as_bytes())
}
