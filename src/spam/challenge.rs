use std::time::Duration;

use rand::rngs::OsRng;
use rand::{Rng, RngCore};

use crate::config::CaptchaConfig;
use crate::constants::CAPTCHA_ALPHABET;
use crate::counters::CounterStore;
use crate::error::Result;

/// One issued challenge: the opaque token plus the answer the caller renders
#[derive(Debug)]
pub struct Challenge {
    pub token: String,
    /// Rendered server-side into the challenge image, never sent to clients
    pub answer: String,
}

/// CAPTCHA-style challenge issue/verify service
///
/// Tokens are single use: the stored answer is consumed on the first
/// verification attempt whether or not the response matches.
#[derive(Clone)]
pub struct CaptchaService {
    counters: CounterStore,
    cfg: CaptchaConfig,
}

impl CaptchaService {
    pub fn new(counters: CounterStore, cfg: CaptchaConfig) -> Self {
        Self { counters, cfg }
    }

    /// Generate a challenge and store it with a short TTL
    pub async fn issue(&self) -> Result<Challenge> {
        let answer = random_answer(self.cfg.length);
        let token = random_token();

        self.counters
            .put_ttl(
                &captcha_key(&token),
                &answer,
                Duration::from_secs(self.cfg.ttl_secs),
            )
            .await?;

        Ok(Challenge { token, answer })
    }

    /// Verify a response against a previously issued token
    ///
    /// An expired or unknown token fails; a known token is deleted before
    /// the comparison so a second attempt always fails.
    pub async fn verify(&self, token: &str, response: &str) -> Result<bool> {
        match self.counters.take(&captcha_key(token)).await? {
            Some(expected) => Ok(answers_match(&expected, response)),
            None => Ok(false),
        }
    }
}

fn captcha_key(token: &str) -> String {
    format!("captcha:{token}")
}

/// Case-insensitive comparison after trimming surrounding whitespace
fn answers_match(expected: &str, response: &str) -> bool {
    response.trim().eq_ignore_ascii_case(expected)
}

fn random_answer(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| CAPTCHA_ALPHABET[rng.gen_range(0..CAPTCHA_ALPHABET.len())] as char)
        .collect()
}

fn random_token() -> String {
    let mut raw = [0u8; 16];
    OsRng.fill_bytes(&mut raw);
    hex::encode(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_has_no_ambiguous_characters() {
        for ambiguous in [b'0', b'O', b'1', b'I', b'L'] {
            assert!(!CAPTCHA_ALPHABET.contains(&ambiguous));
        }
    }

    #[test]
    fn test_random_answer_uses_alphabet() {
        let answer = random_answer(6);
        assert_eq!(answer.chars().count(), 6);
        assert!(answer.bytes().all(|b| CAPTCHA_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_random_token_format() {
        let token = random_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(random_token(), token);
    }

    #[test]
    fn test_answers_match_is_case_insensitive() {
        assert!(answers_match("XK7P2M", "xk7p2m"));
        assert!(answers_match("XK7P2M", "XK7P2M"));
    }

    #[test]
    fn test_answers_match_trims_whitespace() {
        assert!(answers_match("XK7P2M", "  xk7p2m \n"));
    }

    #[test]
    fn test_answers_match_rejects_wrong_response() {
        assert!(!answers_match("XK7P2M", "XK7P2N"));
        assert!(!answers_match("XK7P2M", ""));
    }

    #[test]
    fn test_captcha_key_format() {
        assert_eq!(captcha_key("abcd"), "captcha:abcd");
    }
}
