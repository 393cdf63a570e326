use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Deployment environment. Admin auth is enforced outside development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn requires_admin_auth(self) -> bool {
        !matches!(self, Environment::Development)
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => anyhow::bail!("Unknown ENVIRONMENT '{other}'"),
        }
    }
}

/// S3 location the file-fetch capability reads uploads from.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub anthropic_api_key: String,
    pub environment: Environment,
    pub conversion_api_url: Option<String>,
    pub conversion_api_token: Option<String>,
    pub s3: Option<S3Settings>,
    pub admin_password: Option<String>,
    pub admin_max_attempts: u32,
    pub admin_cooldown_minutes: i64,
    pub admin_session_hours: i64,
    pub request_ttl_hours: u64,
    pub cleanup_after_hours: i64,
    pub cleanup_interval_minutes: u64,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let s3 = match optional_env("S3_BUCKET") {
            Some(bucket) => Some(S3Settings {
                bucket,
                endpoint: require_env("S3_ENDPOINT")?,
                access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
                secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            }),
            None => None,
        };

        Ok(Config {
            redis_url: require_env("REDIS_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            environment: optional_env("ENVIRONMENT")
                .map(|v| v.parse::<Environment>())
                .transpose()?
                .unwrap_or(Environment::Development),
            conversion_api_url: optional_env("CONVERSION_API_URL"),
            conversion_api_token: optional_env("CONVERSION_API_TOKEN"),
            s3,
            admin_password: optional_env("ADMIN_PASSWORD"),
            admin_max_attempts: parse_env("ADMIN_MAX_ATTEMPTS", 3)?,
            admin_cooldown_minutes: parse_env("ADMIN_COOLDOWN_MINUTES", 15)?,
            admin_session_hours: parse_env("ADMIN_SESSION_HOURS", 24)?,
            request_ttl_hours: parse_env("REQUEST_TTL_HOURS", 72)?,
            cleanup_after_hours: parse_env("CLEANUP_AFTER_HOURS", 24)?,
            cleanup_interval_minutes: parse_env("CLEANUP_INTERVAL_MINUTES", 60)?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number")),
        None => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Config {
            redis_url: "redis://localhost:6379".to_string(),
            anthropic_api_key: "test-key".to_string(),
            environment: Environment::Development,
            conversion_api_url: None,
            conversion_api_token: None,
            s3: None,
            admin_password: Some("s3cret".to_string()),
            admin_max_attempts: 3,
            admin_cooldown_minutes: 15,
            admin_session_hours: 24,
            request_ttl_hours: 72,
            cleanup_after_hours: 24,
            cleanup_interval_minutes: 60,
            port: 8080,
            rust_log: "info".to_string(),
        }
    }
}
