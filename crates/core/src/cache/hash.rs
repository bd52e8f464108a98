//! Request-identity key generation.

use sha2::{Digest, Sha256};

/// Compute the store key identifying a request: method plus canonical URL.
///
/// Two requests map to the same entry exactly when both components match.
pub fn request_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
