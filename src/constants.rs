/// Sentinel returned by `PiiCipher::decrypt` on any failure.
/// Square brackets keep it visually distinct from any real address.
pub const DECRYPT_FAILED: &str = "[DECRYPTION_FAILED]";

/// Version prefix on every encrypted PII token.
/// A future scheme change gets a new prefix; old tokens stay readable.
pub const PII_TOKEN_PREFIX: &str = "pii1:";

/// Captcha answer alphabet with ambiguous characters removed (no 0/O, 1/I/L)
pub const CAPTCHA_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Contents shorter than this are never fingerprinted for duplicate detection
pub const MIN_FINGERPRINT_CHARS: usize = 10;

/// Penalty weights for the scoring layers that are structural rather than
/// tunable: rate limiting, duplicates, and the media block list.
pub const RATE_LIMIT_WEIGHT: i32 = 10;
pub const DUPLICATE_WEIGHT: i32 = 4;
pub const BANNED_MEDIA_WEIGHT: i32 = 10;

/// Weight that guarantees a block on its own (definitive-abuse signals)
pub const DEFINITIVE_WEIGHT: i32 = 100;

/// Remaining-quota level below which the Spur client logs a warning
pub const SPUR_LOW_BALANCE: i64 = 100;

// =============================================================================
// Error Messages
// =============================================================================

/// Error message for invalid identity hash format
pub const ERR_INVALID_IDENTITY_HASH: &str =
    "Identity hash must be a valid SHA-256 hash (64 hex characters)";
