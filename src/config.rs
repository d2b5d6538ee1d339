//! Application configuration loaded from environment variables.
//!
//! Token secrets are required at startup; a missing secret is fatal and
//! the process never binds its listener.

use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Non-sensitive ---
    /// Server port
    pub port: u16,
    /// Frontend URL for CORS and OAuth redirects
    pub frontend_url: String,
    /// Redis URL for the session cache; absent falls back to in-memory
    pub redis_url: Option<String>,
    /// Issuer label embedded in TOTP provisioning URIs
    pub totp_issuer: String,
    /// Transactional mail API endpoint; absent runs the mailer offline
    pub mailer_api_url: Option<String>,
    /// IP geolocation API endpoint; absent degrades to "unknown"
    pub geoip_api_url: Option<String>,

    // --- Secrets (required) ---
    /// Access-token JWT signing secret
    pub access_secret: String,
    /// Refresh-token JWT signing secret
    pub refresh_secret: String,
    /// Protect-token JWT signing secret
    pub protect_secret: String,
    /// Activation JWT secret (OTP envelope, pending-2FA ticket)
    pub activation_secret: String,
    /// Symmetric encryption + HMAC keying secret
    pub crypto_secret: String,
    /// Cookie-signing secret (min 32 bytes)
    pub cookie_secret: String,
    /// Mail API key
    pub mailer_api_key: Option<String>,

    // --- Token lifetimes ---
    /// Access token TTL in minutes (default 30)
    pub access_ttl_minutes: i64,
    /// Refresh token TTL in days (default 3)
    pub refresh_ttl_days: i64,
    /// Protect token TTL in days (default 3)
    pub protect_ttl_days: i64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let cookie_secret = require("COOKIE_SECRET")?;
        if cookie_secret.len() < 32 {
            return Err(ConfigError::Invalid(
                "COOKIE_SECRET must be at least 32 bytes",
            ));
        }

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),
            redis_url: env::var("REDIS_URL").ok(),
            totp_issuer: env::var("TOTP_ISSUER").unwrap_or_else(|_| "Parceld".to_string()),
            mailer_api_url: env::var("MAILER_API_URL").ok(),
            geoip_api_url: env::var("GEOIP_API_URL").ok(),

            access_secret: require("ACCESS_TOKEN")?,
            refresh_secret: require("REFRESH_TOKEN")?,
            protect_secret: require("PROTECT_TOKEN")?,
            activation_secret: require("ACTIVATION_SECRET")?,
            crypto_secret: require("CRYPTO_SECRET")?,
            cookie_secret,
            mailer_api_key: env::var("MAILER_API_KEY").ok(),

            access_ttl_minutes: ttl("ACCESS_TOKEN_EXPIRE", 30),
            refresh_ttl_days: ttl("REFRESH_TOKEN_EXPIRE", 3),
            protect_ttl_days: ttl("PROTECT_TOKEN_EXPIRE", 3),
        })
    }

    /// Default config for tests only.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            frontend_url: "http://localhost:3001".to_string(),
            redis_url: None,
            totp_issuer: "Parceld".to_string(),
            mailer_api_url: None,
            geoip_api_url: None,
            access_secret: "test_access_secret".to_string(),
            refresh_secret: "test_refresh_secret".to_string(),
            protect_secret: "test_protect_secret".to_string(),
            activation_secret: "test_activation_secret".to_string(),
            crypto_secret: "test_crypto_secret".to_string(),
            cookie_secret: "test_cookie_secret_32_bytes_minimum!!".to_string(),
            mailer_api_key: None,
            access_ttl_minutes: 30,
            refresh_ttl_days: 3,
            protect_ttl_days: 3,
        }
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn ttl(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
