use std::env;

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| format!("Invalid {}", key)),
        Err(_) => Ok(default),
    }
}

/// Application configuration loaded from environment variables
///
/// Every threshold, window, and TTL the decision pipeline uses is resolved
/// here once at startup and injected into the owning component. Nothing
/// reads the environment after `from_env` returns.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub allowed_origins: Vec<String>,
    pub environment: String,
    /// Server-side pepper for deterministic identity hashes
    pub ip_hash_pepper: String,
    /// Active PII encryption secret
    pub pii_encryption_key: String,
    /// Previous secret, kept decryptable during key rotation
    pub pii_encryption_key_previous: Option<String>,
    pub spam: SpamConfig,
    pub captcha: CaptchaConfig,
    pub sfs: SfsConfig,
    pub spur: SpurConfig,
    pub retention: RetentionConfig,
}

/// Thresholds and windows for the risk decision engine
#[derive(Debug, Clone)]
pub struct SpamConfig {
    pub post_rate_limit: u64,
    pub post_rate_window_secs: u64,
    pub thread_rate_limit: u64,
    pub thread_rate_window_secs: u64,
    pub risk_threshold_high: i32,
    pub risk_threshold_block: i32,
    pub duplicate_fingerprint_ttl_secs: u64,
    pub ip_reputation_ttl_secs: u64,
    pub url_count_threshold: usize,
    pub caps_ratio_threshold: f64,
    pub excessive_length_threshold: usize,
    pub min_content_chars: usize,
    pub repeated_run_length: usize,
}

#[derive(Debug, Clone)]
pub struct CaptchaConfig {
    pub ttl_secs: u64,
    pub length: usize,
}

/// StopForumSpam lookup/reporting settings
#[derive(Debug, Clone)]
pub struct SfsConfig {
    pub enabled: bool,
    /// Required for reporting; lookups work without it
    pub api_key: String,
    pub confidence_threshold: f64,
    pub timeout_secs: u64,
}

/// Spur context API settings
#[derive(Debug, Clone)]
pub struct SpurConfig {
    pub enabled: bool,
    pub api_token: String,
    pub timeout_secs: u64,
}

/// Retention windows in days, per protected dataset
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub interval_secs: u64,
    pub report_ip_days: u32,
    pub ban_ip_days: u32,
    pub disclosure_days: u32,
    pub decision_days: u32,
    pub audit_ip_days: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists (development)
        dotenvy::dotenv().ok();

        let server_host = env_string("SERVER_HOST", "0.0.0.0");
        let server_port = env_parse("SERVER_PORT", 8080u16)?;

        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;
        let redis_url = env_string("REDIS_URL", "redis://127.0.0.1:6379");

        let allowed_origins = env_string("ALLOWED_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let environment = env_string("ENVIRONMENT", "development");

        let ip_hash_pepper = env::var("IP_HASH_PEPPER")
            .map_err(|_| "IP_HASH_PEPPER must be set for identity hashing".to_string())?;

        let pii_encryption_key = env::var("PII_ENCRYPTION_KEY")
            .map_err(|_| "PII_ENCRYPTION_KEY must be set for PII storage".to_string())?;
        let pii_encryption_key_previous = env::var("PII_ENCRYPTION_KEY_PREVIOUS").ok();

        let spam = SpamConfig {
            post_rate_limit: env_parse("POST_RATE_LIMIT", 5)?,
            post_rate_window_secs: env_parse("POST_RATE_WINDOW_SECS", 60)?,
            thread_rate_limit: env_parse("THREAD_RATE_LIMIT", 1)?,
            thread_rate_window_secs: env_parse("THREAD_RATE_WINDOW_SECS", 300)?,
            risk_threshold_high: env_parse("RISK_THRESHOLD_HIGH", 7)?,
            risk_threshold_block: env_parse("RISK_THRESHOLD_BLOCK", 10)?,
            duplicate_fingerprint_ttl_secs: env_parse("DUPLICATE_FINGERPRINT_TTL_SECS", 3600)?,
            ip_reputation_ttl_secs: env_parse("IP_REPUTATION_TTL_SECS", 86400)?,
            url_count_threshold: env_parse("URL_COUNT_THRESHOLD", 3)?,
            caps_ratio_threshold: env_parse("CAPS_RATIO_THRESHOLD", 0.7)?,
            excessive_length_threshold: env_parse("EXCESSIVE_LENGTH_THRESHOLD", 1500)?,
            min_content_chars: env_parse("MIN_CONTENT_CHARS", 3)?,
            repeated_run_length: env_parse("REPEATED_RUN_LENGTH", 10)?,
        };

        let captcha = CaptchaConfig {
            ttl_secs: env_parse("CAPTCHA_TTL_SECS", 300)?,
            length: env_parse("CAPTCHA_LENGTH", 6)?,
        };

        let sfs = SfsConfig {
            enabled: env_parse("STOPFORUMSPAM_ENABLED", true)?,
            api_key: env_string("STOPFORUMSPAM_API_KEY", ""),
            confidence_threshold: env_parse("STOPFORUMSPAM_CONFIDENCE_THRESHOLD", 80.0)?,
            timeout_secs: env_parse("STOPFORUMSPAM_TIMEOUT_SECS", 2)?,
        };

        let spur_token = env_string("SPUR_API_TOKEN", "");
        let spur = SpurConfig {
            // An empty token disables the integration regardless of the flag
            enabled: env_parse("SPUR_ENABLED", false)? && !spur_token.is_empty(),
            api_token: spur_token,
            timeout_secs: env_parse("SPUR_TIMEOUT_SECS", 3)?,
        };

        let retention = RetentionConfig {
            interval_secs: env_parse("RETENTION_INTERVAL_SECS", 86400)?,
            report_ip_days: env_parse("REPORT_IP_RETENTION_DAYS", 90)?,
            ban_ip_days: env_parse("BAN_IP_RETENTION_DAYS", 30)?,
            disclosure_days: env_parse("DISCLOSURE_RETENTION_DAYS", 30)?,
            decision_days: env_parse("DECISION_RETENTION_DAYS", 365)?,
            audit_ip_days: env_parse("AUDIT_IP_RETENTION_DAYS", 365)?,
        };

        Ok(Config {
            server_host,
            server_port,
            database_url,
            redis_url,
            allowed_origins,
            environment,
            ip_hash_pepper,
            pii_encryption_key,
            pii_encryption_key_previous,
            spam,
            captcha,
            sfs,
            spur,
            retention,
        })
    }

    /// Get server address as string
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
