use std::time::Duration;

use serde::Deserialize;

use crate::config::SfsConfig;
use crate::error::{AppError, Result};

const LOOKUP_URL: &str = "http://api.stopforumspam.org/api";
const REPORT_URL: &str = "https://www.stopforumspam.com/add.php";

/// StopForumSpam reputation client
///
/// Lookups fail open: any timeout, transport error, non-2xx status, or
/// malformed payload is treated as "no match" so the posting path never
/// blocks on this dependency. Reporting requires a provisioned API key.
pub struct StopForumSpamClient {
    client: reqwest::Client,
    config: SfsConfig,
}

/// Per-axis lookup result (`ip`, `email`, or `username`)
#[derive(Debug, Default, Deserialize)]
pub struct SfsAxis {
    #[serde(default)]
    pub appears: i64,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub frequency: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct SfsResponse {
    #[serde(default)]
    pub success: i64,
    #[serde(default)]
    pub ip: Option<SfsAxis>,
    #[serde(default)]
    pub email: Option<SfsAxis>,
    #[serde(default)]
    pub username: Option<SfsAxis>,
}

impl StopForumSpamClient {
    pub fn new(config: SfsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Check whether any identity axis is a confident spam-list match
    ///
    /// Returns `false` on every failure mode (fail-open), never an error.
    pub async fn check(&self, ip: &str, email: Option<&str>, username: Option<&str>) -> bool {
        if !self.config.enabled {
            return false;
        }

        match self.lookup(ip, email, username).await {
            Ok(response) => is_listed(&response, self.config.confidence_threshold),
            Err(e) => {
                tracing::warn!("StopForumSpam lookup failed, treating as no match: {}", e);
                false
            }
        }
    }

    async fn lookup(
        &self,
        ip: &str,
        email: Option<&str>,
        username: Option<&str>,
    ) -> Result<SfsResponse> {
        let mut query: Vec<(&str, &str)> = vec![("json", "1"), ("ip", ip)];
        if let Some(email) = email {
            query.push(("email", email));
        }
        if let Some(username) = username {
            query.push(("username", username));
        }

        let response = self
            .client
            .get(LOOKUP_URL)
            .query(&query)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    /// Submit confirmed abuse evidence to the reporting endpoint
    ///
    /// The address travels only to this one authorized endpoint and is never
    /// logged here.
    pub async fn submit(&self, ip: &str, username: &str, evidence: &str) -> Result<()> {
        if self.config.api_key.is_empty() {
            tracing::warn!("StopForumSpam API key not configured, refusing to submit");
            return Err(AppError::ReportingDisabled);
        }

        let params = [
            ("username", username),
            ("ip_addr", ip),
            ("evidence", evidence),
            ("api_key", self.config.api_key.as_str()),
        ];

        self.client
            .post(REPORT_URL)
            .form(&params)
            .send()
            .await?
            .error_for_status()?;

        tracing::info!("Submitted abuse report to StopForumSpam");
        Ok(())
    }
}

/// Classify a lookup response against the confidence threshold
///
/// A match requires `appears` on at least one axis with confidence at or
/// above the threshold; an unsuccessful API response never matches.
pub fn is_listed(response: &SfsResponse, threshold: f64) -> bool {
    if response.success == 0 {
        return false;
    }

    [&response.ip, &response.email, &response.username]
        .into_iter()
        .flatten()
        .any(|axis| axis.appears != 0 && axis.confidence >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> SfsResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_confident_ip_match() {
        let response = parse(
            r#"{"success":1,"ip":{"appears":1,"frequency":255,"lastseen":"2026-01-04 10:00:00","confidence":99.9}}"#,
        );
        assert!(is_listed(&response, 80.0));
    }

    #[test]
    fn test_low_confidence_is_not_a_match() {
        let response = parse(r#"{"success":1,"ip":{"appears":1,"confidence":42.5}}"#);
        assert!(!is_listed(&response, 80.0));
        assert!(is_listed(&response, 40.0));
    }

    #[test]
    fn test_appears_zero_is_not_a_match() {
        let response = parse(r#"{"success":1,"ip":{"appears":0,"confidence":99.0}}"#);
        assert!(!is_listed(&response, 80.0));
    }

    #[test]
    fn test_unsuccessful_response_never_matches() {
        let response = parse(r#"{"success":0,"ip":{"appears":1,"confidence":99.0}}"#);
        assert!(!is_listed(&response, 80.0));
    }

    #[test]
    fn test_any_axis_can_match() {
        let response = parse(
            r#"{"success":1,"ip":{"appears":0,"confidence":0},"username":{"appears":1,"confidence":91.0}}"#,
        );
        assert!(is_listed(&response, 80.0));
    }

    #[test]
    fn test_missing_axes_parse_as_no_match() {
        let response = parse(r#"{"success":1}"#);
        assert!(!is_listed(&response, 80.0));
    }

    #[test]
    fn test_missing_confidence_defaults_to_zero() {
        let response = parse(r#"{"success":1,"ip":{"appears":1}}"#);
        assert!(!is_listed(&response, 80.0));
        assert!(is_listed(&response, 0.0));
    }
}
