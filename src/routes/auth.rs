// SPDX-License-Identifier: MIT

//! Public authentication endpoints: signup, email verification, signin,
//! OAuth callbacks, 2FA verification and token refresh.
//!
//! No durable account exists until the emailed OTP is confirmed; the
//! whole pending signup travels inside an encrypted continuation token
//! the client holds.

use crate::cookies::{CookieKind, PENDING_2FA_COOKIE, REFRESH_COOKIE};
use crate::crypto;
use crate::error::{AppError, Result};
use crate::fingerprint::{self, RequestContext};
use crate::models::{normalize_email, LinkedProvider, OAuthProfile, Provider, Role, User};
use crate::response::ApiResponse;
use crate::services::MailMessage;
use crate::store::NewUser;
use crate::{AppKey, AppState};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{post, put},
    Json, Router,
};
use axum_extra::extract::cookie::{CookieJar, SignedCookieJar};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/auth/signup", post(signup))
        .route("/api/v1/auth/verify-email", post(verify_email))
        .route("/api/v1/auth/signin", post(signin))
        .route("/api/v1/auth/oauth/{provider}", post(oauth_callback))
        .route("/api/v1/auth/refresh-token", post(refresh_token))
        .route("/api/v1/auth/verify-2fa", post(verify_2fa))
        .route("/api/v1/auth/forgot-password", post(forgot_password))
        .route("/api/v1/auth/reset-password/{token}", put(reset_password))
}

/// Encrypted continuation payload for a signup awaiting its OTP.
#[derive(Debug, Serialize, Deserialize)]
struct PendingSignup {
    family_name: String,
    given_name: String,
    email: String,
    normalized_email: String,
    phone: Option<String>,
    password_hash: String,
    otp: String,
    ip: String,
}

/// Encrypted pending-2FA ticket: password/OAuth check passed, TOTP not
/// yet confirmed.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PendingTwoFa {
    pub id: String,
    pub remember: bool,
}

const DUPLICATE_EMAIL: &str = "This email is already registered. Use a different email address.";
const BAD_CREDENTIALS: &str = "Incorrect email or password.";

#[derive(Debug, Deserialize, Validate)]
struct SignupRequest {
    #[validate(length(min = 1, max = 100))]
    family_name: String,
    #[validate(length(min = 1, max = 100))]
    given_name: String,
    #[validate(email)]
    email: String,
    phone: Option<String>,
    #[validate(length(min = 8, max = 128))]
    password: String,
}

async fn signup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SignupRequest>,
) -> Result<ApiResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let normalized = normalize_email(&payload.email);
    if state
        .users
        .find_by_email_or_normalized(&payload.email, &normalized)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(DUPLICATE_EMAIL.to_string()));
    }

    let password_hash = bcrypt::hash(&payload.password, 12)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hash failed: {e}")))?;

    let otp = format!("{:06}", crypto::generate_otp());
    let pending = PendingSignup {
        family_name: payload.family_name,
        given_name: payload.given_name,
        email: payload.email.clone(),
        normalized_email: normalized,
        phone: payload.phone,
        password_hash,
        otp: otp.clone(),
        ip: fingerprint::client_ip(&headers),
    };
    let token = state.tokens.seal_envelope(&pending, 10)?;

    state
        .mailer
        .send(MailMessage {
            to: payload.email,
            subject: "Verify your email".to_string(),
            body: format!("Your verification code is {otp}. It expires in 10 minutes."),
        })
        .await?;

    Ok(
        ApiResponse::ok("A verification code has been sent to your email.")
            .with_data(json!({ "token": token })),
    )
}

#[derive(Debug, Deserialize)]
struct VerifyEmailRequest {
    token: String,
    otp: String,
}

async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<ApiResponse> {
    let pending: PendingSignup = state.tokens.open_envelope(&payload.token)?;

    if !crypto::safe_compare(&payload.otp, &pending.otp) {
        return Err(AppError::Unauthorized(
            "The verification code is incorrect. Check the code and try again.".to_string(),
        ));
    }

    let profile = OAuthProfile {
        email: pending.email.clone(),
        verified: true,
        family_name: pending.family_name.clone(),
        given_name: pending.given_name.clone(),
        avatar_url: None,
    };

    let user = state
        .users
        .create(NewUser {
            family_name: pending.family_name,
            given_name: pending.given_name,
            email: pending.email,
            normalized_email: pending.normalized_email,
            phone: pending.phone,
            password: Some(pending.password_hash),
            role: Role::Customer,
            verified: true,
            avatar_url: None,
            auth: vec![LinkedProvider {
                provider: Provider::Jwt,
                profile,
            }],
        })
        .await?;

    tracing::info!(user_id = %user.id, "Account created");
    Ok(ApiResponse::created("Your email has been verified. You can now sign in.")
        .with_data(json!({ "user": user })))
}

#[derive(Debug, Deserialize, Validate)]
struct SigninRequest {
    #[validate(email)]
    email: String,
    password: String,
    #[serde(default)]
    remember: bool,
}

async fn signin(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    signed: SignedCookieJar<AppKey>,
    plain: CookieJar,
    Json(payload): Json<SigninRequest>,
) -> Result<Response> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    // Absent account and wrong password produce the same message.
    let bad = || AppError::Unauthorized(BAD_CREDENTIALS.to_string());

    let normalized = normalize_email(&payload.email);
    let user = state
        .users
        .find_by_email_or_normalized(&payload.email, &normalized)
        .await?
        .ok_or_else(bad)?;

    let hash = user.password.as_deref().ok_or_else(bad)?;
    if !bcrypt::verify(&payload.password, hash).unwrap_or(false) {
        return Err(bad());
    }

    if !user.verified {
        return Err(AppError::Unauthorized(
            "Please verify your email address before signing in.".to_string(),
        ));
    }

    if user.two_fa.enabled {
        return pending_two_fa_response(&state, &user, payload.remember, signed);
    }

    let (signed, plain, data) =
        establish_session(&state, &headers, &user, payload.remember, signed, plain).await?;
    Ok((
        signed,
        plain,
        ApiResponse::ok("Signed in successfully.").with_data(data),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct OAuthRequest {
    /// Provider access token obtained by the client's authorization flow
    token: String,
    #[serde(default)]
    remember: bool,
}

async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    signed: SignedCookieJar<AppKey>,
    plain: CookieJar,
    Json(payload): Json<OAuthRequest>,
) -> Result<Response> {
    let provider: Provider = provider
        .parse()
        .map_err(|_| AppError::Validation("Unsupported identity provider".to_string()))?;

    let profile = state.oauth.fetch_profile(provider, &payload.token).await?;
    let normalized = normalize_email(&profile.email);

    let user = match state
        .users
        .find_by_email_or_normalized(&profile.email, &normalized)
        .await?
    {
        Some(user) => {
            state
                .users
                .link_provider(
                    &user.id,
                    LinkedProvider {
                        provider,
                        profile: profile.clone(),
                    },
                )
                .await?;
            user
        }
        None => {
            let user = state
                .users
                .create(NewUser {
                    family_name: profile.family_name.clone(),
                    given_name: profile.given_name.clone(),
                    email: profile.email.clone(),
                    normalized_email: normalized,
                    phone: None,
                    password: None,
                    role: Role::Customer,
                    verified: profile.verified,
                    avatar_url: profile.avatar_url.clone(),
                    auth: vec![LinkedProvider { provider, profile }],
                })
                .await?;
            tracing::info!(user_id = %user.id, ?provider, "Account created from OAuth profile");
            user
        }
    };

    if user.two_fa.enabled {
        return pending_two_fa_response(&state, &user, payload.remember, signed);
    }

    let (signed, plain, mut data) =
        establish_session(&state, &headers, &user, payload.remember, signed, plain).await?;
    data["redirect"] = json!(format!(
        "{}/oauth/success?role={}",
        state.config.frontend_url, user.role
    ));

    Ok((
        signed,
        plain,
        ApiResponse::ok("Signed in successfully.").with_data(data),
    )
        .into_response())
}

async fn refresh_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    signed: SignedCookieJar<AppKey>,
    plain: CookieJar,
) -> Result<Response> {
    let raw_refresh = plain.get(REFRESH_COOKIE).map(|c| c.value().to_string());

    match refresh_flow(&state, &headers, raw_refresh).await {
        Ok((user, triple, remember)) => {
            let signed = signed.add(state.cookies.build(CookieKind::Access, triple.access, remember));
            let plain = plain
                .add(state.cookies.build(CookieKind::Refresh, triple.refresh, remember))
                .add(state.cookies.build(CookieKind::Protect, triple.protect, remember));
            Ok((
                signed,
                plain,
                ApiResponse::ok("Session refreshed.").with_data(json!({ "role": user.role })),
            )
                .into_response())
        }
        // Any refresh failure de-authenticates the client entirely.
        Err(err) => {
            let (signed, plain) = state.cookies.clear_all(signed, plain);
            Ok((signed, plain, err).into_response())
        }
    }
}

async fn refresh_flow(
    state: &AppState,
    headers: &HeaderMap,
    raw_refresh: Option<String>,
) -> Result<(User, crate::tokens::TokenTriple, bool)> {
    let raw = raw_refresh.ok_or_else(AppError::session_expired)?;
    let claims = state.tokens.verify_refresh(&raw)?;

    let ctx = RequestContext::from_headers(headers);
    if state.tokens.signature_mismatch(&claims, &ctx) {
        tracing::warn!(sub = %claims.sub, "Refresh token presented from a different device");
        return Err(AppError::session_expired());
    }

    let old_digest = claims.token.ok_or_else(AppError::session_expired)?;
    // A revoked session must not be revivable through its refresh token.
    if !state.sessions.is_live(&claims.sub, &old_digest).await? {
        return Err(AppError::session_expired());
    }

    let user = state
        .users
        .find_by_id(&claims.sub)
        .await?
        .ok_or_else(AppError::session_expired)?;

    let remember = claims.remember.unwrap_or(false);
    let triple = state.sessions.rotate(&ctx, &user, &old_digest, remember).await?;

    Ok((user, triple, remember))
}

#[derive(Debug, Deserialize, Validate)]
struct ForgotPasswordRequest {
    #[validate(email)]
    email: String,
}

async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<ApiResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    // The response never reveals whether the account exists.
    let reply = ApiResponse::ok("If that email is registered, a reset link has been sent.");

    let normalized = normalize_email(&payload.email);
    let Some(user) = state
        .users
        .find_by_email_or_normalized(&payload.email, &normalized)
        .await?
    else {
        return Ok(reply);
    };

    let token = crypto::random_hex_string();
    let expires = chrono::Utc::now() + chrono::Duration::minutes(10);
    // Only the one-way hash is stored; the raw token exists solely in
    // the mail.
    state
        .users
        .set_password_reset(&user.id, &crypto::hash_hex(&token), expires)
        .await?;

    state
        .mailer
        .send(MailMessage {
            to: user.email,
            subject: "Reset your password".to_string(),
            body: format!(
                "Reset your password within 10 minutes: {}/reset-password/{token}",
                state.config.frontend_url
            ),
        })
        .await?;

    Ok(reply)
}

#[derive(Debug, Deserialize, Validate)]
struct ResetPasswordRequest {
    #[validate(length(min = 8, max = 128))]
    password: String,
}

async fn reset_password(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<ApiResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let user = state
        .users
        .find_by_reset_token(&crypto::hash_hex(&token))
        .await?
        .ok_or_else(|| {
            AppError::Unauthorized("The reset link is invalid or has expired.".to_string())
        })?;

    let password_hash = bcrypt::hash(&payload.password, 12)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hash failed: {e}")))?;
    state.users.set_password(&user.id, &password_hash).await?;

    // A password change invalidates every live session.
    state.sessions.revoke_all(&user.id).await?;

    tracing::info!(user_id = %user.id, "Password reset completed");
    Ok(ApiResponse::ok("Your password has been updated. Please sign in again."))
}

#[derive(Debug, Deserialize)]
struct VerifyTwoFaRequest {
    code: String,
}

async fn verify_2fa(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    signed: SignedCookieJar<AppKey>,
    plain: CookieJar,
    Json(payload): Json<VerifyTwoFaRequest>,
) -> Result<Response> {
    let ticket_raw = signed
        .get(PENDING_2FA_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(AppError::session_expired)?;
    let ticket: PendingTwoFa = state.tokens.open_envelope(&ticket_raw)?;

    let user = state
        .users
        .find_by_id(&ticket.id)
        .await?
        .ok_or_else(AppError::session_expired)?;

    let secret = user
        .two_fa
        .secret
        .as_ref()
        .ok_or_else(AppError::session_expired)?;
    if !state.totp.verify(secret, &payload.code)? {
        return Err(AppError::Unauthorized(
            "The two-factor code is invalid or has expired.".to_string(),
        ));
    }

    let (signed, plain, data) =
        establish_session(&state, &headers, &user, ticket.remember, signed, plain).await?;
    Ok((
        signed,
        plain,
        ApiResponse::ok("Signed in successfully.").with_data(data),
    )
        .into_response())
}

fn pending_two_fa_response(
    state: &AppState,
    user: &User,
    remember: bool,
    signed: SignedCookieJar<AppKey>,
) -> Result<Response> {
    let ticket = state.tokens.seal_envelope(
        &PendingTwoFa {
            id: user.id.clone(),
            remember,
        },
        5,
    )?;
    let signed = signed.add(state.cookies.build(CookieKind::Pending2fa, ticket, false));

    Ok((
        signed,
        ApiResponse::ok("Two-factor authentication required.")
            .with_data(json!({ "enable2fa": true })),
    )
        .into_response())
}

/// Mint the token triple, set all three cookies, clear any pending-2FA
/// cookie and record the session in both tiers.
pub(crate) async fn establish_session(
    state: &AppState,
    headers: &HeaderMap,
    user: &User,
    remember: bool,
    signed: SignedCookieJar<AppKey>,
    plain: CookieJar,
) -> Result<(SignedCookieJar<AppKey>, CookieJar, Value)> {
    let mut ctx = RequestContext::from_headers(headers);
    ctx.location = state.geo.lookup(&ctx.ip).await;

    let triple = state.sessions.open(&ctx, user, remember).await?;

    let signed = signed
        .add(state.cookies.build(CookieKind::Access, triple.access, remember))
        .add(state.cookies.removal(CookieKind::Pending2fa));
    let plain = plain
        .add(state.cookies.build(CookieKind::Refresh, triple.refresh, remember))
        .add(state.cookies.build(CookieKind::Protect, triple.protect, remember));

    Ok((signed, plain, json!({ "user": user, "role": user.role })))
}
