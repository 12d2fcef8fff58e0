use std::sync::Arc;
use std::time::Duration;

use crate::config::SpamConfig;
use crate::constants::{
    BANNED_MEDIA_WEIGHT, DUPLICATE_WEIGHT, MIN_FINGERPRINT_CHARS, RATE_LIMIT_WEIGHT,
};
use crate::counters::CounterStore;
use crate::error::Result;
use crate::reputation::{SpurClient, StopForumSpamClient};
use crate::security;
use crate::spam::content;
use crate::spam::{FactorKind, RiskFactor};

const BANNED_MEDIA_SET: &str = "banned_media";

/// The decision rendered on one submission
#[derive(Debug, Clone)]
pub struct Verdict {
    pub allowed: bool,
    pub score: i32,
    pub reasons: Vec<String>,
    pub challenge_required: bool,
}

/// Multi-layer risk decision engine
///
/// Layers, strictly additive and independently failing open:
///   0a. StopForumSpam check (IP reputation, definitive)
///   0b. Spur IP intelligence (VPN/proxy/bot signals)
///   1.  Rate limiting (sliding windows per identity)
///   2.  Content fingerprinting (duplicate detection)
///   3.  Content heuristics
///   4.  Media-fingerprint block list
///   5.  Identity reputation (decaying counter)
pub struct SpamEngine {
    counters: CounterStore,
    sfs: Arc<StopForumSpamClient>,
    spur: Arc<SpurClient>,
    cfg: SpamConfig,
}

impl SpamEngine {
    pub fn new(
        counters: CounterStore,
        sfs: Arc<StopForumSpamClient>,
        spur: Arc<SpurClient>,
        cfg: SpamConfig,
    ) -> Self {
        Self {
            counters,
            sfs,
            spur,
            cfg,
        }
    }

    /// Run all layers on a potential post and render a verdict
    ///
    /// `identity_hash` keys the ephemeral counters; `source_address` is the
    /// raw address used only for external intelligence lookups and is never
    /// logged or persisted here. This call never fails: a broken dependency
    /// contributes zero signal.
    ///
    /// Side effects: the rate-limit inserts, the duplicate-fingerprint mark,
    /// and a reputation bump when the score reaches the challenge threshold.
    pub async fn evaluate(
        &self,
        identity_hash: &str,
        content: &str,
        is_thread: bool,
        media_hash: Option<&str>,
        source_address: Option<&str>,
    ) -> Verdict {
        let mut factors: Vec<RiskFactor> = Vec::new();

        // Layers 0a/0b: independent external lookups, run concurrently
        if let Some(address) = source_address {
            let (sfs_listed, spur_factors) = tokio::join!(
                self.sfs.check(address, None, None),
                self.spur.evaluate(address)
            );
            if sfs_listed {
                factors.push(RiskFactor::definitive(
                    FactorKind::SpamList,
                    "Listed by StopForumSpam",
                ));
            }
            factors.extend(spur_factors);
        }

        // Layer 1: rate limiting
        factors.extend(self.rate_limit_factors(identity_hash, is_thread).await);

        // Layer 2: duplicate content
        if let Some(factor) = self.duplicate_factor(content).await {
            factors.push(factor);
        }

        // Layer 3: content heuristics
        factors.extend(content::score_content(content, &self.cfg));

        // Layer 4: media fingerprint block list
        if let Some(hash) = media_hash {
            match self.counters.set_contains(BANNED_MEDIA_SET, hash).await {
                Ok(true) => factors.push(RiskFactor::new(
                    FactorKind::BannedMedia,
                    BANNED_MEDIA_WEIGHT,
                    "Banned media fingerprint",
                )),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Media block list unavailable, skipping layer: {}", e)
                }
            }
        }

        // Layer 5: identity reputation
        match self.counters.current(&reputation_key(identity_hash)).await {
            Ok(prior) if prior > 0 => factors.push(RiskFactor::new(
                FactorKind::Reputation,
                prior as i32,
                format!("Prior abuse reputation ({prior})"),
            )),
            Ok(_) => {}
            Err(e) => tracing::warn!("Reputation counter unavailable, skipping layer: {}", e),
        }

        let verdict = verdict_from(&factors, &self.cfg);

        // High-scoring attempts feed the decaying reputation counter
        if verdict.score >= self.cfg.risk_threshold_high {
            if let Err(e) = self
                .counters
                .increment_decaying(
                    &reputation_key(identity_hash),
                    Duration::from_secs(self.cfg.ip_reputation_ttl_secs),
                )
                .await
            {
                tracing::warn!("Failed to record reputation bump: {}", e);
            }
        }

        tracing::debug!(
            score = verdict.score,
            allowed = verdict.allowed,
            challenge = verdict.challenge_required,
            "Submission evaluated"
        );

        verdict
    }

    async fn rate_limit_factors(&self, identity_hash: &str, is_thread: bool) -> Vec<RiskFactor> {
        let mut factors = Vec::new();

        let post_window = Duration::from_secs(self.cfg.post_rate_window_secs);
        match self
            .counters
            .record_and_count(&post_rate_key(identity_hash), post_window)
            .await
        {
            Ok(count) if count > self.cfg.post_rate_limit => {
                factors.push(RiskFactor::new(
                    FactorKind::RateLimit,
                    RATE_LIMIT_WEIGHT,
                    format!(
                        "Post rate limit exceeded ({count}/{} per {}s)",
                        self.cfg.post_rate_limit, self.cfg.post_rate_window_secs
                    ),
                ));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Counter store unavailable, skipping post rate limit: {}", e),
        }

        if is_thread {
            let thread_window = Duration::from_secs(self.cfg.thread_rate_window_secs);
            match self
                .counters
                .record_and_count(&thread_rate_key(identity_hash), thread_window)
                .await
            {
                Ok(count) if count > self.cfg.thread_rate_limit => {
                    factors.push(RiskFactor::new(
                        FactorKind::RateLimit,
                        RATE_LIMIT_WEIGHT,
                        format!(
                            "Thread creation rate limit exceeded ({count}/{} per {}s)",
                            self.cfg.thread_rate_limit, self.cfg.thread_rate_window_secs
                        ),
                    ));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Counter store unavailable, skipping thread rate limit: {}", e)
                }
            }
        }

        factors
    }

    async fn duplicate_factor(&self, content: &str) -> Option<RiskFactor> {
        let normalized = content::normalize(content);
        if normalized.chars().count() < MIN_FINGERPRINT_CHARS {
            return None;
        }

        let key = format!(
            "fingerprint:{}",
            security::content_fingerprint(&normalized)
        );
        match self
            .counters
            .seen_or_mark(
                &key,
                Duration::from_secs(self.cfg.duplicate_fingerprint_ttl_secs),
            )
            .await
        {
            Ok(true) => Some(RiskFactor::new(
                FactorKind::Duplicate,
                DUPLICATE_WEIGHT,
                "Duplicate content detected",
            )),
            Ok(false) => None,
            Err(e) => {
                tracing::warn!("Counter store unavailable, skipping duplicate check: {}", e);
                None
            }
        }
    }

    /// Add a media fingerprint to the block set
    pub async fn ban_media(&self, hash: &str) -> Result<()> {
        self.counters.add_to_set(BANNED_MEDIA_SET, hash).await
    }
}

/// Sum collected factors into the final verdict
///
/// `allowed` requires the sum to stay under the block threshold and no
/// definitive factor to have fired; a challenge is demanded only for
/// submissions that remain allowed.
pub fn verdict_from(factors: &[RiskFactor], cfg: &SpamConfig) -> Verdict {
    let score: i32 = factors.iter().map(|f| f.weight).sum();
    let definitive = factors.iter().any(|f| f.definitive);
    let allowed = score < cfg.risk_threshold_block && !definitive;

    Verdict {
        allowed,
        score,
        reasons: factors.iter().map(|f| f.reason.clone()).collect(),
        challenge_required: allowed && score >= cfg.risk_threshold_high,
    }
}

fn post_rate_key(identity_hash: &str) -> String {
    format!("ratelimit:post:{identity_hash}")
}

fn thread_rate_key(identity_hash: &str) -> String {
    format!("ratelimit:thread:{identity_hash}")
}

fn reputation_key(identity_hash: &str) -> String {
    format!("ip_reputation:{identity_hash}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SpamConfig {
        SpamConfig {
            post_rate_limit: 5,
            post_rate_window_secs: 60,
            thread_rate_limit: 1,
            thread_rate_window_secs: 300,
            risk_threshold_high: 7,
            risk_threshold_block: 10,
            duplicate_fingerprint_ttl_secs: 3600,
            ip_reputation_ttl_secs: 86400,
            url_count_threshold: 3,
            caps_ratio_threshold: 0.7,
            excessive_length_threshold: 1500,
            min_content_chars: 3,
            repeated_run_length: 10,
        }
    }

    fn factor(weight: i32, reason: &str) -> RiskFactor {
        RiskFactor::new(FactorKind::Content, weight, reason)
    }

    #[test]
    fn test_no_factors_is_allowed() {
        let verdict = verdict_from(&[], &test_config());
        assert!(verdict.allowed);
        assert_eq!(verdict.score, 0);
        assert!(!verdict.challenge_required);
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn test_score_below_challenge_threshold() {
        let verdict = verdict_from(&[factor(4, "Duplicate content detected")], &test_config());
        assert!(verdict.allowed);
        assert!(!verdict.challenge_required);
    }

    #[test]
    fn test_challenge_band() {
        let factors = [factor(4, "a"), factor(3, "b")];
        let verdict = verdict_from(&factors, &test_config());
        assert!(verdict.allowed);
        assert_eq!(verdict.score, 7);
        assert!(verdict.challenge_required);
    }

    #[test]
    fn test_block_threshold() {
        let factors = [factor(10, "Post rate limit exceeded (6/5 per 60s)")];
        let verdict = verdict_from(&factors, &test_config());
        assert!(!verdict.allowed);
        // A blocked submission never asks for a challenge
        assert!(!verdict.challenge_required);
    }

    #[test]
    fn test_exactly_under_block_threshold_is_allowed() {
        let factors = [factor(9, "a")];
        let verdict = verdict_from(&factors, &test_config());
        assert!(verdict.allowed);
        assert!(verdict.challenge_required);
    }

    #[test]
    fn test_definitive_factor_blocks_regardless_of_sum() {
        let mut low = RiskFactor::definitive(FactorKind::SpamList, "Listed by StopForumSpam");
        low.weight = 0;
        let verdict = verdict_from(&[low], &test_config());
        assert!(!verdict.allowed);
        assert_eq!(verdict.score, 0);
    }

    #[test]
    fn test_reasons_preserve_factor_order() {
        let factors = [factor(1, "first"), factor(2, "second"), factor(3, "third")];
        let verdict = verdict_from(&factors, &test_config());
        assert_eq!(verdict.reasons, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_counter_key_formats() {
        assert_eq!(post_rate_key("abc"), "ratelimit:post:abc");
        assert_eq!(thread_rate_key("abc"), "ratelimit:thread:abc");
        assert_eq!(reputation_key("abc"), "ip_reputation:abc");
    }
}
