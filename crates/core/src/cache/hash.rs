//! Request key hashing.

use sha2::{Digest, Sha256};

/// Compute the storage hash for a request key.
///
/// The method is expected to be uppercase and the URL canonical; callers
/// normalize before hashing so equal requests land on the same row.
pub fn compute_request_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_request_key("GET", "https://app.test/index.html");
        let hash2 = compute_request_key("GET", "https://app.test/index.html");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_different_method() {
        let get = compute_request_key("GET", "https://app.test/");
        let head = compute_request_key("HEAD", "https://app.test/");
        assert_ne!(get, head);
    }

    #[test]
    fn test_hash_no_boundary_collision() {
        let a = compute_request_key("GET", "x");
        let b = compute_request_key("GETx", "");
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_request_key("GET", "https://app.test/");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
