use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use serde::Deserialize;

use crate::config::SpurConfig;
use crate::constants::SPUR_LOW_BALANCE;
use crate::error::Result;
use crate::spam::{FactorKind, RiskFactor};

const API_BASE_URL: &str = "https://api.spur.us";
const CONTEXT_ENDPOINT: &str = "/v2/context/";
const BALANCE_HEADER: &str = "x-balance-remaining";

/// Risk tags that contribute to scoring when present
const HIGH_RISK_FACTORS: &[&str] = &[
    "CALLBACK_PROXY",
    "TUNNEL",
    "GEO_MISMATCH",
    "WEB_SCRAPING",
    "BOTNET",
    "MALWARE",
];

/// Risk tags that warrant an immediate block
const BLOCK_RISK_FACTORS: &[&str] = &["BOTNET", "MALWARE"];

/// Tunnel types that indicate anonymous proxying
const ANONYMOUS_TUNNEL_TYPES: &[&str] = &["VPN", "PROXY", "TOR"];

const DATACENTER_INFRA: &str = "DATACENTER";

/// Spur Context API client for IP intelligence
///
/// Detects VPNs, residential proxies, and bots from real-time IP context:
/// risk tags, tunnel info, infrastructure classification, and client
/// behavior metrics. Every failure mode degrades to "no signal".
pub struct SpurClient {
    client: reqwest::Client,
    config: SpurConfig,
}

/// Normalized IP context from the API response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IpContext {
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub tunnels: Vec<Tunnel>,
    #[serde(default)]
    pub infrastructure: String,
    #[serde(default)]
    pub client: ClientMetrics,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub ip: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Tunnel {
    #[serde(default)]
    pub anonymous: bool,
    #[serde(default)]
    pub operator: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Concentration metrics for clients observed behind the address
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientMetrics {
    #[serde(default)]
    pub proxies: Vec<String>,
    #[serde(default)]
    pub behaviors: Vec<String>,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub countries: i64,
    #[serde(default)]
    pub types: Vec<String>,
}

impl SpurClient {
    pub fn new(config: SpurConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Look up IP context for a public address
    ///
    /// Private, loopback, and reserved ranges are skipped without a network
    /// call. Returns `None` when disabled or on any lookup failure,
    /// including a 429 rate-limit response.
    pub async fn lookup(&self, address: &str) -> Option<IpContext> {
        if !self.config.enabled {
            return None;
        }

        let ip: IpAddr = match address.parse() {
            Ok(ip) => ip,
            Err(_) => {
                tracing::debug!("Spur lookup skipped: not an IP address");
                return None;
            }
        };

        if !is_public(&ip) {
            tracing::debug!("Spur lookup skipped: non-public address");
            return None;
        }

        let url = format!("{}{}{}", API_BASE_URL, CONTEXT_ENDPOINT, ip);
        let response = match self
            .client
            .get(url)
            .header("Token", &self.config.api_token)
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Spur lookup failed: {}", e);
                return None;
            }
        };

        let remaining = response
            .headers()
            .get(BALANCE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok());

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(remaining = ?remaining, "Spur rate limit reached");
            return None;
        }

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Spur API returned non-success status");
            return None;
        }

        // Alert-only: a draining quota never blocks requests
        if let Some(remaining) = remaining {
            if remaining < SPUR_LOW_BALANCE {
                tracing::warn!(remaining, "Spur API balance running low");
            }
        }

        match response.json::<IpContext>().await {
            Ok(context) => Some(context),
            Err(e) => {
                tracing::warn!("Spur API returned invalid JSON: {}", e);
                None
            }
        }
    }

    /// Evaluate an address for abuse risk
    ///
    /// Composes `lookup` with the pure scorer; no signal means no factors.
    pub async fn evaluate(&self, address: &str) -> Vec<RiskFactor> {
        match self.lookup(address).await {
            Some(context) => {
                let factors = score_context(&context);
                tracing::info!(
                    score = factors.iter().map(|f| f.weight).sum::<i32>(),
                    signals = factors.len(),
                    "Spur evaluation complete"
                );
                factors
            }
            None => Vec::new(),
        }
    }
}

/// Score a normalized IP context into risk factors
pub fn score_context(context: &IpContext) -> Vec<RiskFactor> {
    let mut factors = Vec::new();

    for risk in &context.risks {
        if BLOCK_RISK_FACTORS.contains(&risk.as_str()) {
            factors.push(RiskFactor::definitive(
                FactorKind::IpContext,
                format!("Critical risk factor ({risk})"),
            ));
        } else if HIGH_RISK_FACTORS.contains(&risk.as_str()) {
            factors.push(RiskFactor::new(
                FactorKind::IpContext,
                15,
                format!("High risk factor ({risk})"),
            ));
        }
    }

    let anonymous: Vec<&Tunnel> = context
        .tunnels
        .iter()
        .filter(|t| t.anonymous && ANONYMOUS_TUNNEL_TYPES.contains(&t.kind.as_str()))
        .collect();
    if !anonymous.is_empty() {
        let described = anonymous
            .iter()
            .map(|t| {
                if t.operator.is_empty() {
                    t.kind.clone()
                } else {
                    format!("{} ({})", t.kind, t.operator)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        factors.push(RiskFactor::new(
            FactorKind::IpContext,
            ((anonymous.len() as i32) * 10).min(30),
            format!("Anonymous tunnel detected: {described}"),
        ));
    }

    if context.infrastructure == DATACENTER_INFRA {
        factors.push(RiskFactor::new(
            FactorKind::IpContext,
            5,
            "Datacenter infrastructure",
        ));
    }

    let proxy_count = context.client.proxies.len();
    if proxy_count > 0 {
        factors.push(RiskFactor::new(
            FactorKind::IpContext,
            ((proxy_count as i32) * 3).min(15),
            format!("Associated with {proxy_count} proxy service(s)"),
        ));
    }

    let client_count = context.client.count;
    if client_count > 100 {
        factors.push(RiskFactor::new(
            FactorKind::IpContext,
            10,
            format!("High client concentration ({client_count} clients)"),
        ));
    } else if client_count > 20 {
        factors.push(RiskFactor::new(
            FactorKind::IpContext,
            5,
            format!("Moderate client concentration ({client_count} clients)"),
        ));
    }

    let countries = context.client.countries;
    if countries > 5 {
        factors.push(RiskFactor::new(
            FactorKind::IpContext,
            8,
            format!("Clients from {countries} countries"),
        ));
    }

    for behavior in &context.client.behaviors {
        if behavior.contains("TOR") || behavior.contains("PROXY") {
            factors.push(RiskFactor::new(
                FactorKind::IpContext,
                5,
                format!("Behavior flag ({behavior})"),
            ));
        }
    }

    factors
}

/// True only for addresses worth a context lookup
///
/// Private, loopback, link-local, documentation, CGNAT, and reserved ranges
/// are filtered before any network call.
pub fn is_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => is_public_v6(v6),
    }
}

fn is_public_v4(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();
    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_unspecified()
        // CGNAT 100.64.0.0/10
        || (octets[0] == 100 && (octets[1] & 0xc0) == 64)
        // Reserved 240.0.0.0/4
        || octets[0] >= 240)
}

fn is_public_v6(ip: &Ipv6Addr) -> bool {
    let segments = ip.segments();
    !(ip.is_loopback()
        || ip.is_unspecified()
        // Unique local fc00::/7
        || (segments[0] & 0xfe00) == 0xfc00
        // Link local fe80::/10
        || (segments[0] & 0xffc0) == 0xfe80
        // Documentation 2001:db8::/32
        || (segments[0] == 0x2001 && segments[1] == 0x0db8))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_context(json: &str) -> IpContext {
        serde_json::from_str(json).unwrap()
    }

    fn total(factors: &[RiskFactor]) -> i32 {
        factors.iter().map(|f| f.weight).sum()
    }

    #[test]
    fn test_parse_full_response() {
        let context = parse_context(
            r#"{
                "ip": "198.51.100.7",
                "risks": ["TUNNEL", "WEB_SCRAPING"],
                "tunnels": [{"anonymous": true, "operator": "EXAMPLE_VPN", "type": "VPN"}],
                "infrastructure": "DATACENTER",
                "organization": "Example Hosting",
                "client": {
                    "proxies": ["LUMINATI_PROXY"],
                    "behaviors": ["TOR_PROXY_USER"],
                    "count": 150,
                    "countries": 8,
                    "types": ["DESKTOP"]
                }
            }"#,
        );

        assert_eq!(context.risks.len(), 2);
        assert_eq!(context.tunnels[0].kind, "VPN");
        assert!(context.tunnels[0].anonymous);
        assert_eq!(context.client.count, 150);
    }

    #[test]
    fn test_parse_sparse_response_defaults() {
        let context = parse_context(r#"{"ip": "198.51.100.7"}"#);
        assert!(context.risks.is_empty());
        assert!(context.tunnels.is_empty());
        assert_eq!(context.client.count, 0);
        assert!(score_context(&context).is_empty());
    }

    #[test]
    fn test_botnet_risk_is_definitive() {
        let context = parse_context(r#"{"risks": ["BOTNET"]}"#);
        let factors = score_context(&context);
        assert_eq!(factors.len(), 1);
        assert!(factors[0].definitive);
        assert_eq!(factors[0].weight, 100);
    }

    #[test]
    fn test_soft_risk_scores_without_blocking() {
        let context = parse_context(r#"{"risks": ["GEO_MISMATCH"]}"#);
        let factors = score_context(&context);
        assert_eq!(total(&factors), 15);
        assert!(factors.iter().all(|f| !f.definitive));
    }

    #[test]
    fn test_unknown_risk_tags_are_ignored() {
        let context = parse_context(r#"{"risks": ["SOMETHING_NEW"]}"#);
        assert!(score_context(&context).is_empty());
    }

    #[test]
    fn test_anonymous_tunnel_scoring_caps_at_30() {
        let context = parse_context(
            r#"{"tunnels": [
                {"anonymous": true, "operator": "A", "type": "VPN"},
                {"anonymous": true, "operator": "B", "type": "PROXY"},
                {"anonymous": true, "operator": "C", "type": "TOR"},
                {"anonymous": true, "operator": "D", "type": "VPN"}
            ]}"#,
        );
        let factors = score_context(&context);
        assert_eq!(total(&factors), 30);
        assert!(factors[0].reason.contains("VPN (A)"));
    }

    #[test]
    fn test_non_anonymous_tunnel_is_ignored() {
        let context =
            parse_context(r#"{"tunnels": [{"anonymous": false, "operator": "X", "type": "VPN"}]}"#);
        assert!(score_context(&context).is_empty());
    }

    #[test]
    fn test_client_concentration_tiers() {
        let high = parse_context(r#"{"client": {"count": 150}}"#);
        assert_eq!(total(&score_context(&high)), 10);

        let moderate = parse_context(r#"{"client": {"count": 50}}"#);
        assert_eq!(total(&score_context(&moderate)), 5);

        let low = parse_context(r#"{"client": {"count": 3}}"#);
        assert!(score_context(&low).is_empty());
    }

    #[test]
    fn test_combined_signals_accumulate() {
        let context = parse_context(
            r#"{
                "risks": ["TUNNEL"],
                "tunnels": [{"anonymous": true, "operator": "A", "type": "VPN"}],
                "infrastructure": "DATACENTER",
                "client": {"proxies": ["P1", "P2"], "count": 25, "countries": 6}
            }"#,
        );
        // 15 + 10 + 5 + 6 + 5 + 8
        assert_eq!(total(&score_context(&context)), 49);
    }

    #[test]
    fn test_is_public_v4() {
        assert!(is_public(&"203.0.114.7".parse().unwrap()));
        assert!(is_public(&"8.8.8.8".parse().unwrap()));
        assert!(!is_public(&"10.0.0.1".parse().unwrap()));
        assert!(!is_public(&"172.16.5.5".parse().unwrap()));
        assert!(!is_public(&"192.168.1.1".parse().unwrap()));
        assert!(!is_public(&"127.0.0.1".parse().unwrap()));
        assert!(!is_public(&"169.254.0.1".parse().unwrap()));
        assert!(!is_public(&"100.64.0.1".parse().unwrap()));
        assert!(!is_public(&"240.0.0.1".parse().unwrap()));
        assert!(!is_public(&"0.0.0.0".parse().unwrap()));
    }

    #[test]
    fn test_is_public_v6() {
        assert!(is_public(&"2606:4700::1111".parse().unwrap()));
        assert!(!is_public(&"::1".parse().unwrap()));
        assert!(!is_public(&"fc00::1".parse().unwrap()));
        assert!(!is_public(&"fd12:3456::1".parse().unwrap()));
        assert!(!is_public(&"fe80::1".parse().unwrap()));
        assert!(!is_public(&"2001:db8::1".parse().unwrap()));
    }
}
