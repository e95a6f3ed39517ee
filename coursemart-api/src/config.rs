//! Service configuration

use std::fmt;
use std::str::FromStr;

/// Default port
pub const DEFAULT_PORT: u16 = 3000;

/// Runtime configuration, read from the environment
#[derive(Clone)]
pub struct Config {
    /// Port to listen on
    pub port: u16,

    /// SQLite database path; `None` keeps everything in memory
    pub database_path: Option<String>,

    /// HMAC secret for session tokens
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,

    /// Lifetime of an emailed one-time code
    pub otp_ttl_minutes: i64,
    /// How often expired codes are purged
    pub otp_cleanup_interval_secs: u64,

    pub bcrypt_cost: u32,

    /// Upper bound applied to `pageSize` in paginated search
    pub max_page_size: u64,

    pub telegram_bot_token: Option<String>,
    pub telegram_api_base: String,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` header on webhook calls
    pub telegram_webhook_secret: Option<String>,

    pub razorpay_key_id: Option<String>,
    pub razorpay_key_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_path: None,
            jwt_secret: "dev-secret-change-me".to_string(),
            jwt_ttl_hours: 24 * 7,
            otp_ttl_minutes: 10,
            otp_cleanup_interval_secs: 300,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            max_page_size: 500,
            telegram_bot_token: None,
            telegram_api_base: "https://api.telegram.org".to_string(),
            telegram_webhook_secret: None,
            razorpay_key_id: None,
            razorpay_key_secret: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparsable
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let jwt_secret = get_env("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET is not set, using an insecure development secret");
            defaults.jwt_secret.clone()
        });

        Self {
            port: parse_env("PORT", defaults.port),
            database_path: get_env("DATABASE_PATH"),
            jwt_secret,
            jwt_ttl_hours: parse_env("JWT_TTL_HOURS", defaults.jwt_ttl_hours),
            otp_ttl_minutes: parse_env("OTP_TTL_MINUTES", defaults.otp_ttl_minutes),
            otp_cleanup_interval_secs: parse_env(
                "OTP_CLEANUP_INTERVAL_SECS",
                defaults.otp_cleanup_interval_secs,
            ),
            bcrypt_cost: parse_env("BCRYPT_COST", defaults.bcrypt_cost),
            max_page_size: parse_env("MAX_PAGE_SIZE", defaults.max_page_size).max(1),
            telegram_bot_token: get_env("TELEGRAM_BOT_TOKEN"),
            telegram_api_base: get_env("TELEGRAM_API_BASE").unwrap_or(defaults.telegram_api_base),
            telegram_webhook_secret: get_env("TELEGRAM_WEBHOOK_SECRET"),
            razorpay_key_id: get_env("RAZORPAY_KEY_ID"),
            razorpay_key_secret: get_env("RAZORPAY_KEY_SECRET"),
        }
    }

    pub fn otp_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.otp_ttl_minutes)
    }

    pub fn jwt_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.jwt_ttl_hours)
    }
}

/// Get a non-empty environment variable
fn get_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    match get_env(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparsable configuration value");
            default
        }),
    }
}

fn redact(secret: &Option<String>) -> &'static str {
    if secret.is_some() {
        "<set>"
    } else {
        "<unset>"
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_path", &self.database_path)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_ttl_hours", &self.jwt_ttl_hours)
            .field("otp_ttl_minutes", &self.otp_ttl_minutes)
            .field("otp_cleanup_interval_secs", &self.otp_cleanup_interval_secs)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("max_page_size", &self.max_page_size)
            .field("telegram_bot_token", &redact(&self.telegram_bot_token))
            .field("telegram_api_base", &self.telegram_api_base)
            .field("telegram_webhook_secret", &redact(&self.telegram_webhook_secret))
            .field("razorpay_key_id", &self.razorpay_key_id)
            .field("razorpay_key_secret", &redact(&self.razorpay_key_secret))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config {
            jwt_secret: "super-secret".to_string(),
            telegram_bot_token: Some("123:ABC".to_string()),
            razorpay_key_secret: Some("rzp-secret".to_string()),
            ..Config::default()
        };

        let printed = format!("{:?}", config);
        assert!(!printed.contains("super-secret"));
        assert!(!printed.contains("123:ABC"));
        assert!(!printed.contains("rzp-secret"));
        assert!(printed.contains("max_page_size: 500"));
    }

    #[test]
    fn test_ttl_helpers() {
        let config = Config::default();
        assert_eq!(config.otp_ttl(), chrono::Duration::minutes(10));
        assert_eq!(config.jwt_ttl(), chrono::Duration::hours(168));
    }
}
