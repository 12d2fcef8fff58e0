use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::constants::{DECRYPT_FAILED, PII_TOKEN_PREFIX};
use crate::error::{AppError, Result};

const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Envelope encryption for PII at rest
///
/// AEAD is XChaCha20-Poly1305 with a fresh random 24-byte nonce per call, so
/// encrypting the same address twice never yields the same token. Tokens are
/// `pii1:<hex(nonce || ciphertext || tag)>`; the prefix selects the scheme, so
/// a rotated key or a future cipher can coexist with old rows.
///
/// Decryption never throws: every failure mode collapses to the
/// `[DECRYPTION_FAILED]` sentinel so hot paths can branch without unwinding.
pub struct PiiCipher {
    key: Key,
    /// Retired key kept readable during rotation
    previous_key: Option<Key>,
}

impl PiiCipher {
    /// Build a cipher from the configured secret(s)
    ///
    /// Secrets of arbitrary length are accepted; the working key is the
    /// SHA-256 digest of the secret, which always yields the 32 bytes the
    /// cipher needs.
    pub fn new(secret: &str, previous_secret: Option<&str>) -> Self {
        Self {
            key: derive_key(secret),
            previous_key: previous_secret.map(derive_key),
        }
    }

    /// Encrypt a PII value into a versioned token
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = XChaCha20Poly1305::new(&self.key);
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| AppError::Encryption("AEAD seal failed".to_string()))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", PII_TOKEN_PREFIX, hex::encode(payload)))
    }

    /// Decrypt a token produced by `encrypt`
    ///
    /// Returns the plaintext, or `[DECRYPTION_FAILED]` for anything that is
    /// not a well-formed token sealed under a known key: wrong prefix, bad
    /// hex, truncated payload, tampered ciphertext, empty input.
    pub fn decrypt(&self, token: &str) -> String {
        let Some(encoded) = token.strip_prefix(PII_TOKEN_PREFIX) else {
            tracing::warn!("PII decrypt failed: unrecognized token format");
            return DECRYPT_FAILED.to_string();
        };

        let payload = match hex::decode(encoded) {
            Ok(bytes) => bytes,
            Err(_) => {
                tracing::warn!("PII decrypt failed: invalid hex payload");
                return DECRYPT_FAILED.to_string();
            }
        };

        if payload.len() < NONCE_LEN + TAG_LEN {
            tracing::warn!("PII decrypt failed: payload too short");
            return DECRYPT_FAILED.to_string();
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let nonce = XNonce::from_slice(nonce_bytes);

        for key in std::iter::once(&self.key).chain(self.previous_key.as_ref()) {
            let cipher = XChaCha20Poly1305::new(key);
            if let Ok(plaintext) = cipher.decrypt(nonce, ciphertext) {
                return match String::from_utf8(plaintext) {
                    Ok(value) => value,
                    Err(_) => {
                        tracing::warn!("PII decrypt failed: plaintext not UTF-8");
                        DECRYPT_FAILED.to_string()
                    }
                };
            }
        }

        tracing::warn!("PII decrypt failed: authentication failed under all keys");
        DECRYPT_FAILED.to_string()
    }

    /// Best-effort zeroing of a decrypted value
    ///
    /// Overwrites the string's buffer and truncates it. The runtime may have
    /// copied the data elsewhere (reallocation, OS paging); this shrinks the
    /// plaintext's live window, it does not guarantee removal from all memory.
    pub fn wipe(value: &mut String) {
        value.zeroize();
    }

    /// Generate fresh key material for provisioning or rotation
    ///
    /// Returns hex suitable for the PII_ENCRYPTION_KEY environment variable.
    pub fn generate_key() -> String {
        let mut raw = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut raw);
        hex::encode(raw)
    }
}

fn derive_key(secret: &str) -> Key {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    *Key::from_slice(&digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> PiiCipher {
        PiiCipher::new("test-secret", None)
    }

    #[test]
    fn test_roundtrip_basic() {
        let c = cipher();
        let token = c.encrypt("203.0.113.7").unwrap();
        assert!(token.starts_with(PII_TOKEN_PREFIX));
        assert_eq!(c.decrypt(&token), "203.0.113.7");
    }

    #[test]
    fn test_roundtrip_empty() {
        let c = cipher();
        let token = c.encrypt("").unwrap();
        assert_eq!(c.decrypt(&token), "");
    }

    #[test]
    fn test_roundtrip_unicode() {
        let c = cipher();
        let token = c.encrypt("2001:db8::1 テスト 🦀").unwrap();
        assert_eq!(c.decrypt(&token), "2001:db8::1 テスト 🦀");
    }

    #[test]
    fn test_roundtrip_long() {
        let c = cipher();
        let plaintext = "x".repeat(100_000);
        let token = c.encrypt(&plaintext).unwrap();
        assert_eq!(c.decrypt(&token), plaintext);
    }

    #[test]
    fn test_nonce_uniqueness() {
        let c = cipher();
        let a = c.encrypt("203.0.113.7").unwrap();
        let b = c.encrypt("203.0.113.7").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_token_returns_sentinel() {
        let c = cipher();
        let token = c.encrypt("203.0.113.7").unwrap();
        // Flip the final hex digit
        let mut tampered = token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });
        assert_eq!(c.decrypt(&tampered), DECRYPT_FAILED);
    }

    #[test]
    fn test_garbage_inputs_return_sentinel() {
        let c = cipher();
        assert_eq!(c.decrypt(""), DECRYPT_FAILED);
        assert_eq!(c.decrypt("203.0.113.7"), DECRYPT_FAILED);
        assert_eq!(c.decrypt("pii1:zzzz"), DECRYPT_FAILED);
        assert_eq!(c.decrypt("pii1:abcd"), DECRYPT_FAILED);
        assert_eq!(c.decrypt("pii2:0000"), DECRYPT_FAILED);
    }

    #[test]
    fn test_wrong_key_returns_sentinel() {
        let token = cipher().encrypt("203.0.113.7").unwrap();
        let other = PiiCipher::new("different-secret", None);
        assert_eq!(other.decrypt(&token), DECRYPT_FAILED);
    }

    #[test]
    fn test_rotation_decrypts_old_tokens() {
        let old = PiiCipher::new("old-secret", None);
        let token = old.encrypt("203.0.113.7").unwrap();

        let rotated = PiiCipher::new("new-secret", Some("old-secret"));
        assert_eq!(rotated.decrypt(&token), "203.0.113.7");

        // New tokens seal under the new key only
        let fresh = rotated.encrypt("203.0.113.8").unwrap();
        assert_eq!(old.decrypt(&fresh), DECRYPT_FAILED);
    }

    #[test]
    fn test_generate_key_format() {
        let key = PiiCipher::generate_key();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(PiiCipher::generate_key(), key);
    }

    #[test]
    fn test_wipe_clears_value() {
        let mut value = "203.0.113.7".to_string();
        PiiCipher::wipe(&mut value);
        assert!(value.is_empty());
    }
}
