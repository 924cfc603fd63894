use std::str::FromStr;
use std::time::Duration;

use crate::error::AuthError;

/// Default access-token lifetime: 24 hours.
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Default refresh-token lifetime: 7 days.
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Default deadline for a single persistence call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);
/// Longest duration any setting accepts: 10 years.
pub const MAX_DURATION: Duration = Duration::from_secs(3650 * 24 * 60 * 60);

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL (e.g. sqlite://keygate.db?mode=rwc, postgres://...)
    pub database_url: String,

    /// HMAC signing secret for access tokens. Required.
    pub jwt_secret: String,

    /// Access-token lifetime (default: 24h)
    pub access_token_ttl: Duration,

    /// Refresh-token lifetime (default: 168h)
    pub refresh_token_ttl: Duration,

    /// Server host (default: 0.0.0.0)
    pub server_host: String,

    /// Server port (default: 8080)
    pub server_port: u16,

    /// Environment: development, production, test
    pub environment: String,

    /// Audience expected in Google ID tokens. Google login is disabled when unset.
    pub google_client_id: Option<String>,

    /// Seed the admin/user/moderator roles when the server starts.
    pub seed_default_roles: bool,

    /// Existing user to promote to admin when the server starts.
    pub bootstrap_admin_email: Option<String>,

    /// Deadline applied to each persistence call.
    pub store_timeout: Duration,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables (with .env support).
    ///
    /// Fails with [`AuthError::Config`] when `JWT_SECRET` is missing or a
    /// duration/port value cannot be parsed.
    pub fn from_env() -> Result<Self, AuthError> {
        // Load .env file if present (ignore errors if missing)
        let _ = dotenvy::dotenv();

        let jwt_secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                AuthError::Config("JWT_SECRET environment variable is required".into())
            })?;

        Ok(Config {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://keygate.db?mode=rwc".to_string()),
            jwt_secret,
            access_token_ttl: duration_var("JWT_ACCESS_EXPIRY", DEFAULT_ACCESS_TTL)?,
            refresh_token_ttl: duration_var("JWT_REFRESH_EXPIRY", DEFAULT_REFRESH_TTL)?,
            server_host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: match std::env::var("PORT") {
                Ok(raw) => raw
                    .parse()
                    .map_err(|_| AuthError::Config(format!("PORT is not a valid port: {raw}")))?,
                Err(_) => 8080,
            },
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            google_client_id: non_empty_var("GOOGLE_CLIENT_ID"),
            seed_default_roles: flag_var("SEED_DEFAULT_ROLES"),
            bootstrap_admin_email: non_empty_var("BOOTSTRAP_ADMIN_EMAIL"),
            store_timeout: duration_var("STORE_TIMEOUT", DEFAULT_STORE_TIMEOUT)?,
            log_format: match std::env::var("LOG_FORMAT") {
                Ok(raw) => raw.parse()?,
                Err(_) => LogFormat::Compact,
            },
        })
    }

    /// Configuration used by tests: in-memory SQLite, fixed secret.
    pub fn for_tests() -> Self {
        Config {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test-secret-key-for-testing".to_string(),
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: DEFAULT_REFRESH_TTL,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            environment: "test".to_string(),
            google_client_id: Some("test-client-id".to_string()),
            seed_default_roles: false,
            bootstrap_admin_email: None,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            log_format: LogFormat::Compact,
        }
    }

    /// Check if running in development mode.
    pub fn is_dev(&self) -> bool {
        self.environment == "development"
    }

    /// Get the full server address.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(AuthError::Config(format!("unknown LOG_FORMAT: {other}"))),
        }
    }
}

/// Parse a duration such as `90s`, `15m`, `24h`, `7d`, or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, AuthError> {
    let raw = raw.trim();
    let invalid = || AuthError::Config(format!("invalid duration: {raw:?}"));

    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits.parse().map_err(|_| invalid())?;

    let secs = match unit {
        "" | "s" => value,
        "m" => value.checked_mul(60).ok_or_else(invalid)?,
        "h" => value.checked_mul(60 * 60).ok_or_else(invalid)?,
        "d" => value.checked_mul(24 * 60 * 60).ok_or_else(invalid)?,
        _ => return Err(invalid()),
    };
    if secs == 0 {
        return Err(invalid());
    }
    let duration = Duration::from_secs(secs);
    if duration > MAX_DURATION {
        return Err(AuthError::Config(format!(
            "duration {raw:?} exceeds the {}d maximum",
            MAX_DURATION.as_secs() / 86_400
        )));
    }
    Ok(duration)
}

fn duration_var(key: &str, default: Duration) -> Result<Duration, AuthError> {
    match non_empty_var(key) {
        Some(raw) => parse_duration(&raw).map_err(|_| {
            AuthError::Config(format!("{key} is not a valid duration: {raw}"))
        }),
        None => Ok(default),
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn flag_var(key: &str) -> bool {
    matches!(
        std::env::var(key)
            .unwrap_or_default()
            .to_lowercase()
            .as_str(),
        "true" | "1" | "yes"
    )
}
