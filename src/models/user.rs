//! User and session models.
//!
//! Sensitive fields (password hash, linked providers, session log, 2FA
//! secret, reset token) are excluded from default serialization, so the
//! cached user snapshot and every API payload are safe to emit as-is.

use crate::crypto::EncryptedPayload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role assigned to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Agent,
    Customer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Admin => "admin",
            Role::Agent => "agent",
            Role::Customer => "customer",
        };
        f.write_str(s)
    }
}

/// Identity providers an account can be linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Jwt,
    Google,
    Github,
    Twitter,
    Facebook,
    Discord,
    Linkedin,
}

/// Error for a provider name outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown identity provider: {0}")]
pub struct UnknownProvider(pub String);

impl std::str::FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "jwt" => Ok(Provider::Jwt),
            "google" => Ok(Provider::Google),
            "github" => Ok(Provider::Github),
            "twitter" => Ok(Provider::Twitter),
            "facebook" => Ok(Provider::Facebook),
            "discord" => Ok(Provider::Discord),
            "linkedin" => Ok(Provider::Linkedin),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// Best-effort device classification of a raw User-Agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_type: String,
    pub os: String,
    pub browser: String,
    pub user_agent: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            device_type: "unknown".to_string(),
            os: "unknown".to_string(),
            browser: "unknown".to_string(),
            user_agent: "unknown".to_string(),
        }
    }
}

/// Best-effort IP geolocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoLocation {
    pub city: String,
    pub country: String,
    pub lat: f64,
    pub lng: f64,
}

impl Default for GeoLocation {
    fn default() -> Self {
        Self {
            city: "unknown".to_string(),
            country: "unknown".to_string(),
            lat: 0.0,
            lng: 0.0,
        }
    }
}

/// Durable per-session record. `token` is the HMAC of the access token
/// that was live at creation, never the raw token; the cache holds the
/// same digest as the request-time authority while this record carries
/// history and the `status` flag for UI display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub device_info: DeviceInfo,
    pub location: GeoLocation,
    pub ip: String,
    pub logged_in_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub status: bool,
}

/// A linked identity provider. Only the provider name and the normalized
/// profile tuple are retained, not the raw third-party payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedProvider {
    pub provider: Provider,
    pub profile: OAuthProfile,
}

/// Normalized profile tuple every OAuth callback reduces to. The engine
/// is provider-agnostic beyond this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthProfile {
    pub email: String,
    pub verified: bool,
    pub family_name: String,
    pub given_name: String,
    pub avatar_url: Option<String>,
}

/// Two-factor state: enabled flag plus the TOTP secret encrypted at rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwoFa {
    pub enabled: bool,
    #[serde(skip_serializing, default)]
    pub secret: Option<EncryptedPayload>,
}

/// User account. Referenced by the auth core through the `UserStore`
/// trait; parcel/agent fields live with their own subsystems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub family_name: String,
    pub given_name: String,
    pub email: String,
    pub normalized_email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub verified: bool,
    pub avatar_url: Option<String>,
    pub two_fa: TwoFa,

    /// bcrypt hash; absent for OAuth-only accounts
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    #[serde(skip_serializing, default)]
    pub auth: Vec<LinkedProvider>,
    #[serde(skip_serializing, default)]
    pub sessions: Vec<Session>,
    /// One-way hash of the reset token, never the raw token
    #[serde(skip_serializing, default)]
    pub password_reset_token: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_reset_expires: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Normalize an email for uniqueness checks. Gmail ignores dots in the
/// local part; every other domain is lowercased only.
pub fn normalize_email(email: &str) -> String {
    let lower = email.to_lowercase();
    match lower.split_once('@') {
        Some((local, domain)) if domain == "gmail.com" => {
            format!("{}@gmail.com", local.replace('.', ""))
        }
        _ => lower,
    }
}
