use crate::config::SpamConfig;
use crate::spam::{FactorKind, RiskFactor};

/// Normalize content for duplicate fingerprinting: trim, collapse runs of
/// whitespace to single spaces, casefold.
pub fn normalize(content: &str) -> String {
    content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Deterministic content heuristics
///
/// Each rule that fires emits its own factor; thresholds come from
/// configuration so operators can tune them without a rebuild.
pub fn score_content(content: &str, cfg: &SpamConfig) -> Vec<RiskFactor> {
    let mut factors = Vec::new();

    let lower = content.to_lowercase();
    let url_count = lower.matches("http://").count() + lower.matches("https://").count();
    if url_count > cfg.url_count_threshold {
        // Escalates with each link past the threshold
        let weight = (3 + (url_count - cfg.url_count_threshold) as i32).min(6);
        factors.push(RiskFactor::new(
            FactorKind::Content,
            weight,
            format!("Excessive links ({url_count})"),
        ));
    } else if url_count > 1 {
        factors.push(RiskFactor::new(
            FactorKind::Content,
            1,
            format!("Multiple links ({url_count})"),
        ));
    }

    // Caps ratio is computed over letters only, so digits and punctuation
    // cannot dilute it
    let alpha_count = content.chars().filter(|c| c.is_alphabetic()).count();
    if alpha_count > 20 {
        let caps_count = content.chars().filter(|c| c.is_uppercase()).count();
        let ratio = caps_count as f64 / alpha_count as f64;
        if ratio > cfg.caps_ratio_threshold {
            factors.push(RiskFactor::new(
                FactorKind::Content,
                2,
                format!("Excessive capitalization ({:.0}%)", ratio * 100.0),
            ));
        }
    }

    if longest_run(content) >= cfg.repeated_run_length {
        factors.push(RiskFactor::new(
            FactorKind::Content,
            3,
            "Repeated character run",
        ));
    }

    if content.chars().count() > cfg.excessive_length_threshold {
        factors.push(RiskFactor::new(
            FactorKind::Content,
            1,
            "Excessive length",
        ));
    }

    if content.trim().chars().count() < cfg.min_content_chars {
        factors.push(RiskFactor::new(
            FactorKind::Content,
            1,
            "Near-empty content",
        ));
    }

    factors
}

/// Length of the longest run of identical consecutive characters
fn longest_run(content: &str) -> usize {
    let mut longest = 0usize;
    let mut current = 0usize;
    let mut previous: Option<char> = None;

    for c in content.chars() {
        if Some(c) == previous {
            current += 1;
        } else {
            current = 1;
            previous = Some(c);
        }
        longest = longest.max(current);
    }

    longest
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

    fn total(factors: &[RiskFactor]) -> i32 {
        factors.iter().map(|f| f.weight).sum()
    }

    #[test]
    fn test_normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize("  Hello   World \n"), "hello world");
        assert_eq!(normalize("hello world"), normalize("HELLO  WORLD"));
    }

    #[test]
    fn test_benign_content_scores_zero() {
        let factors = score_content("Just a normal reply about the topic.", &test_config());
        assert!(factors.is_empty());
    }

    #[test]
    fn test_multiple_links_minor_penalty() {
        let factors = score_content("see http://a.example and https://b.example", &test_config());
        assert_eq!(total(&factors), 1);
    }

    #[test]
    fn test_excessive_links_escalate() {
        let cfg = test_config();
        let four = score_content("http://a http://b http://c http://d", &cfg);
        assert_eq!(total(&four), 4);

        let six = score_content(
            "http://a http://b http://c http://d http://e http://f",
            &cfg,
        );
        assert_eq!(total(&six), 6);

        // Escalation is capped
        let many = (0..20).map(|i| format!("http://{i}")).collect::<Vec<_>>().join(" ");
        assert_eq!(total(&score_content(&many, &cfg)), 6);
    }

    #[test]
    fn test_caps_ratio_over_letters_only() {
        let cfg = test_config();
        let shouting = "THIS ENTIRE MESSAGE IS SHOUTED AT EVERYONE";
        assert_eq!(total(&score_content(shouting, &cfg)), 2);

        // Digits and punctuation must not dilute the ratio
        let with_noise = "THIS ENTIRE MESSAGE IS SHOUTED 1234567890 !!!";
        assert_eq!(total(&score_content(with_noise, &cfg)), 2);

        // Under 20 letters the rule stays silent
        assert!(score_content("SHORT YELL", &cfg).is_empty());
    }

    #[test]
    fn test_repeated_character_run() {
        let cfg = test_config();
        let factors = score_content("spam aaaaaaaaaa here", &cfg);
        assert_eq!(total(&factors), 3);

        // Nine in a row stays under the default threshold
        assert!(score_content("only aaaaaaaaa here", &cfg).is_empty());
    }

    #[test]
    fn test_excessive_length() {
        let cfg = test_config();
        let long = "word ".repeat(400);
        let factors = score_content(&long, &cfg);
        assert_eq!(total(&factors), 1);
        assert_eq!(factors[0].reason, "Excessive length");
    }

    #[test]
    fn test_near_empty_content() {
        let cfg = test_config();
        let factors = score_content("  a ", &cfg);
        assert_eq!(total(&factors), 1);
        assert_eq!(factors[0].reason, "Near-empty content");
    }

    #[test]
    fn test_repeated_run_plus_links_reach_challenge_threshold() {
        let cfg = test_config();
        let factors = score_content("AAAAAAAAAAAAA http://a http://b http://c http://d", &cfg);
        assert!(total(&factors) >= cfg.risk_threshold_high);
        assert!(total(&factors) < cfg.risk_threshold_block);
    }

    #[test]
    fn test_every_factor_carries_a_reason() {
        let cfg = test_config();
        let factors = score_content("AAAAAAAAAAAAA http://a http://b http://c http://d", &cfg);
        assert!(factors.iter().all(|f| !f.reason.is_empty()));
    }

    #[test]
    fn test_longest_run() {
        assert_eq!(longest_run(""), 0);
        assert_eq!(longest_run("abc"), 1);
        assert_eq!(longest_run("aabbbcc"), 3);
        assert_eq!(longest_run("aaaaaaaaaa"), 10);
    }
}
