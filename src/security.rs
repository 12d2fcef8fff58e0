use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// Identity Hashing (deterministic, non-reversible lookups)
// =============================================================================

/// Derive the deterministic identity hash for a source address
///
/// The hash is what rate-limit keys, reputation counters, and ban lookups are
/// keyed on, so equality queries never need the plaintext address. The pepper
/// lives in an environment variable, not in the database, which keeps offline
/// rainbow-table attacks against leaked rows infeasible.
///
/// # Arguments
/// * `address` - The raw source address (never stored by callers of this function)
/// * `pepper` - The server-side secret pepper
///
/// # Returns
/// * Hex-encoded HMAC-SHA256 of the address under the pepper
pub fn identity_hash(address: &str, pepper: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(pepper.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(address.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Fingerprint hash over already-normalized content (duplicate detection)
pub fn content_fingerprint(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Validate that a value is a SHA-256-shaped hash (64 hex characters)
pub fn is_valid_hash(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_hash_format() {
        let hash = identity_hash("203.0.113.7", "pepper");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_identity_hash_deterministic() {
        let a = identity_hash("203.0.113.7", "pepper");
        let b = identity_hash("203.0.113.7", "pepper");
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_hash_different_addresses() {
        let a = identity_hash("203.0.113.7", "pepper");
        let b = identity_hash("203.0.113.8", "pepper");
        assert_ne!(a, b);
    }

    #[test]
    fn test_identity_hash_different_peppers() {
        let a = identity_hash("203.0.113.7", "pepper-1");
        let b = identity_hash("203.0.113.7", "pepper-2");
        assert_ne!(a, b);
    }

    #[test]
    fn test_content_fingerprint_deterministic() {
        assert_eq!(content_fingerprint("hello world"), content_fingerprint("hello world"));
        assert_ne!(content_fingerprint("hello world"), content_fingerprint("hello worlD"));
    }

    #[test]
    fn test_is_valid_hash() {
        assert!(is_valid_hash(&"a".repeat(64)));
        assert!(is_valid_hash(
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        ));
        assert!(!is_valid_hash("abc123"));
        assert!(!is_valid_hash(&"a".repeat(65)));
        assert!(!is_valid_hash(&"z".repeat(64)));
    }
}
