// SPDX-License-Identifier: MIT

//! Token service: issues and validates the access/refresh/protect triple
//! and the encrypted activation envelopes (OTP, pending-2FA ticket).
//!
//! All tokens are HS256 JWTs, each kind signed with its own secret so
//! compromise of one does not compromise the others. Refresh and protect
//! tokens carry the HMAC of the paired access token, linking the triple
//! together for rotation.

use crate::config::Config;
use crate::crypto::{self, EncryptedPayload};
use crate::error::{AppError, Result};
use crate::fingerprint::{Fingerprint, RequestContext};
use crate::models::Role;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Claims carried by all three session tokens. `remember` and `token`
/// (the access-token HMAC) are present on refresh/protect only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub role: Role,
    /// HMAC of the client IP at issuance
    pub ip: String,
    /// HMAC of the client OS at issuance
    pub device: String,
    /// HMAC of the client browser at issuance
    pub browser: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remember: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Per-mint nonce. `iat`/`exp` have second resolution, so without it
    /// two triples minted in the same second for the same device would
    /// be byte-identical and share one digest.
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// The triple minted on every signin and refresh.
#[derive(Debug, Clone)]
pub struct TokenTriple {
    pub access: String,
    pub refresh: String,
    pub protect: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeClaims {
    encrypted: EncryptedPayload,
    iat: i64,
    exp: i64,
}

/// Signs and verifies session-signature tokens.
#[derive(Clone)]
pub struct TokenService {
    access_secret: String,
    refresh_secret: String,
    protect_secret: String,
    activation_secret: String,
    crypto_secret: String,
    access_ttl_minutes: i64,
    refresh_ttl_days: i64,
    protect_ttl_days: i64,
}

impl TokenService {
    pub fn from_config(config: &Config) -> Self {
        Self {
            access_secret: config.access_secret.clone(),
            refresh_secret: config.refresh_secret.clone(),
            protect_secret: config.protect_secret.clone(),
            activation_secret: config.activation_secret.clone(),
            crypto_secret: config.crypto_secret.clone(),
            access_ttl_minutes: config.access_ttl_minutes,
            refresh_ttl_days: config.refresh_ttl_days,
            protect_ttl_days: config.protect_ttl_days,
        }
    }

    /// HMAC digest of a token, the only form persisted or embedded in
    /// sibling tokens.
    pub fn digest(&self, token: &str) -> String {
        crypto::hmac_hex(&self.crypto_secret, token)
    }

    /// Issue the access/refresh/protect triple bound to the requester's
    /// device fingerprint.
    pub fn issue_triple(
        &self,
        ctx: &RequestContext,
        id: &str,
        role: Role,
        remember: bool,
    ) -> Result<TokenTriple> {
        let fp = Fingerprint::compute(&self.crypto_secret, ctx);
        let now = Utc::now().timestamp();

        let access_claims = TokenClaims {
            sub: id.to_string(),
            role,
            ip: fp.ip.clone(),
            device: fp.device.clone(),
            browser: fp.browser.clone(),
            remember: None,
            token: None,
            jti: crypto::random_hex_string(),
            iat: now,
            exp: now + self.access_ttl_minutes * 60,
        };
        let access = sign(&access_claims, &self.access_secret)?;

        let access_digest = self.digest(&access);

        let refresh_claims = TokenClaims {
            remember: Some(remember),
            token: Some(access_digest.clone()),
            exp: now + self.refresh_ttl_days * 86_400,
            ..access_claims.clone()
        };
        let refresh = sign(&refresh_claims, &self.refresh_secret)?;

        let protect_claims = TokenClaims {
            remember: Some(remember),
            token: Some(access_digest),
            exp: now + self.protect_ttl_days * 86_400,
            ..access_claims
        };
        let protect = sign(&protect_claims, &self.protect_secret)?;

        Ok(TokenTriple {
            access,
            refresh,
            protect,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<TokenClaims> {
        verify(token, &self.access_secret)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<TokenClaims> {
        verify(token, &self.refresh_secret)
    }

    /// True when the presented request does NOT match the fingerprint the
    /// claims were issued against. A mismatch signals replay from another
    /// device/network and is a hard stop, never a soft warning.
    pub fn signature_mismatch(&self, claims: &TokenClaims, ctx: &RequestContext) -> bool {
        let fp = Fingerprint::compute(&self.crypto_secret, ctx);
        !crypto::safe_compare(&claims.device, &fp.device)
            || !crypto::safe_compare(&claims.browser, &fp.browser)
    }

    /// Encrypt `payload` and wrap it in a short-lived activation JWT.
    /// Used for the OTP envelope (10 min) and pending-2FA ticket (5 min).
    pub fn seal_envelope<T: Serialize>(&self, payload: &T, ttl_minutes: i64) -> Result<String> {
        let plaintext = serde_json::to_vec(payload)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("envelope encode failed: {e}")))?;
        let encrypted = crypto::cipher(&plaintext, &self.crypto_secret)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("envelope encrypt failed: {e}")))?;

        let now = Utc::now().timestamp();
        let claims = EnvelopeClaims {
            encrypted,
            iat: now,
            exp: now + ttl_minutes * 60,
        };
        sign(&claims, &self.activation_secret)
    }

    /// Verify and decrypt an activation envelope. Expired, tampered or
    /// foreign tokens all map to the same generic failure.
    pub fn open_envelope<T: DeserializeOwned>(&self, token: &str) -> Result<T> {
        let claims: EnvelopeClaims = verify(token, &self.activation_secret)?;
        let plaintext = crypto::decipher(&claims.encrypted, &self.crypto_secret)?;
        serde_json::from_slice(&plaintext).map_err(|_| AppError::session_expired())
    }
}

fn sign<T: Serialize>(claims: &T, secret: &str) -> Result<String> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT signing failed: {e}")))
}

fn verify<T: DeserializeOwned>(token: &str, secret: &str) -> Result<T> {
    let mut validation = Validation::new(Algorithm::HS256);
    // JWT expiry is the sole timeout mechanism; no leeway.
    validation.leeway = 0;

    decode::<T>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::session_expired())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderMap, HeaderValue};

    fn service() -> TokenService {
        TokenService::from_config(&Config::test_default())
    }

    fn ctx(ua: &str) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_str(ua).unwrap());
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        RequestContext::from_headers(&headers)
    }

    const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
    const FIREFOX_MAC: &str =
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:127.0) Gecko/20100101 Firefox/127.0";

    #[test]
    fn test_triple_links_refresh_to_access_digest() {
        let svc = service();
        let triple = svc
            .issue_triple(&ctx(CHROME_WIN), "u1", Role::Customer, true)
            .unwrap();

        let refresh = svc.verify_refresh(&triple.refresh).unwrap();
        assert_eq!(refresh.token.as_deref(), Some(svc.digest(&triple.access).as_str()));
        assert_eq!(refresh.remember, Some(true));
        assert_eq!(refresh.sub, "u1");

        let access = svc.verify_access(&triple.access).unwrap();
        assert!(access.token.is_none());
    }

    #[test]
    fn test_back_to_back_mints_never_collide() {
        let svc = service();
        let ctx = ctx(CHROME_WIN);

        // Same user, same device, same second: the digests must still
        // differ, or rotation would be a no-op and two signins would
        // share one revocable session entry.
        let a = svc.issue_triple(&ctx, "u1", Role::Customer, false).unwrap();
        let b = svc.issue_triple(&ctx, "u1", Role::Customer, false).unwrap();

        assert_ne!(a.access, b.access);
        assert_ne!(svc.digest(&a.access), svc.digest(&b.access));
        assert_ne!(a.refresh, b.refresh);
    }

    #[test]
    fn test_tokens_not_cross_verifiable() {
        let svc = service();
        let triple = svc
            .issue_triple(&ctx(CHROME_WIN), "u1", Role::Agent, false)
            .unwrap();

        // Each kind has its own secret.
        assert!(svc.verify_access(&triple.refresh).is_err());
        assert!(svc.verify_refresh(&triple.access).is_err());
        assert!(svc.verify_refresh(&triple.protect).is_err());
    }

    #[test]
    fn test_signature_mismatch_detects_device_change() {
        let svc = service();
        let issued = ctx(CHROME_WIN);
        let triple = svc
            .issue_triple(&issued, "u1", Role::Customer, false)
            .unwrap();
        let claims = svc.verify_refresh(&triple.refresh).unwrap();

        assert!(!svc.signature_mismatch(&claims, &issued));
        assert!(svc.signature_mismatch(&claims, &ctx(FIREFOX_MAC)));
    }

    #[test]
    fn test_envelope_roundtrip() {
        let svc = service();

        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Ticket {
            id: String,
            remember: bool,
        }

        let token = svc
            .seal_envelope(
                &Ticket {
                    id: "u1".into(),
                    remember: true,
                },
                5,
            )
            .unwrap();

        let out: Ticket = svc.open_envelope(&token).unwrap();
        assert_eq!(
            out,
            Ticket {
                id: "u1".into(),
                remember: true
            }
        );
    }

    #[test]
    fn test_expired_envelope_rejected() {
        let svc = service();
        let token = svc.seal_envelope(&serde_json::json!({"id": "u1"}), -1).unwrap();
        assert!(svc.open_envelope::<serde_json::Value>(&token).is_err());
    }
}
