//! Content hashing for code map caching. A map is rebuilt only when the
//! SHA-256 of the file content changes.

use sha2::{Digest, Sha256};

/// A SHA-256 content hash.
pub type ContentHash = [u8; 32];

pub fn hash_source(content: &str) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.finalize().into()
}

pub fn to_hex(hash: &ContentHash) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

/// Hex digest of `content`, the form stored on code maps.
pub fn hash_hex(content: &str) -> String {
    to_hex(&hash_source(content))
}
