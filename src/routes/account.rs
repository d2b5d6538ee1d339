// SPDX-License-Identifier: MIT

//! Protected account endpoints: 2FA enrollment, signout variants,
//! session listing and the profile query.
//!
//! Every route here sits behind `validate_token` + `require_auth`, so
//! handlers receive a [`TokenContext`] and [`CurrentUser`] extension.

use crate::error::{AppError, Result};
use crate::middleware::{CurrentUser, TokenContext};
use crate::models::Session;
use crate::response::ApiResponse;
use crate::{AppKey, AppState};
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{CookieJar, SignedCookieJar};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/auth/setup-2fa", get(setup_2fa))
        .route("/api/v1/auth/enable-2fa", put(enable_2fa))
        .route("/api/v1/auth/signout", post(signout))
        .route("/api/v1/auth/signout-all", post(signout_all))
        .route("/api/v1/auth/sessions", get(list_sessions))
        .route("/api/v1/auth/sessions/{token}/revoke", post(revoke_session))
        .route("/api/v1/auth/sessions/revoke-all", post(revoke_other_sessions))
        .route("/api/v1/users/me", get(me))
}

/// Envelope payload carrying the not-yet-persisted encrypted TOTP
/// secret between setup and confirmation.
#[derive(Debug, serde::Serialize, Deserialize)]
struct TwoFaEnrollmentTicket {
    secret: crate::crypto::EncryptedPayload,
}

async fn setup_2fa(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ApiResponse> {
    if user.two_fa.enabled {
        return Err(AppError::Conflict(
            "Two-factor authentication is already enabled.".to_string(),
        ));
    }

    let enrollment = state.totp.begin_enrollment(&user.email)?;
    // Nothing is persisted until the first code is confirmed; the
    // encrypted secret rides an envelope the client returns.
    let token = state.tokens.seal_envelope(
        &TwoFaEnrollmentTicket {
            secret: enrollment.encrypted_secret,
        },
        10,
    )?;

    Ok(ApiResponse::ok("Scan the QR code with your authenticator app.").with_data(json!({
        "otpauth_url": enrollment.otpauth_url,
        "secret": enrollment.secret_base32,
        "token": token,
    })))
}

#[derive(Debug, Deserialize)]
struct EnableTwoFaRequest {
    token: String,
    code: String,
}

async fn enable_2fa(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<EnableTwoFaRequest>,
) -> Result<ApiResponse> {
    let ticket: TwoFaEnrollmentTicket = state.tokens.open_envelope(&payload.token)?;

    if !state.totp.verify(&ticket.secret, &payload.code)? {
        return Err(AppError::Unauthorized(
            "The two-factor code is invalid or has expired.".to_string(),
        ));
    }

    state.users.enable_two_fa(&user.id, ticket.secret).await?;

    // Keep the cached snapshot in step with the durable record.
    if let Some(updated) = state.users.find_by_id(&user.id).await? {
        state.sessions.refresh_snapshot(&updated).await?;
    }

    tracing::info!(user_id = %user.id, "Two-factor authentication enabled");
    Ok(ApiResponse::ok("Two-factor authentication is now enabled."))
}

async fn signout(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<TokenContext>,
    signed: SignedCookieJar<AppKey>,
    plain: CookieJar,
) -> Response {
    let outcome = state
        .sessions
        .revoke_one(&token.claims.sub, &token.access_digest)
        .await;

    // Cookies are cleared whether or not the revocation found the
    // session; the client ends up signed out either way.
    let (signed, plain) = state.cookies.clear_all(signed, plain);
    match outcome {
        Ok(()) => (signed, plain, ApiResponse::ok("Signed out.")).into_response(),
        Err(err) => (signed, plain, err).into_response(),
    }
}

async fn signout_all(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<TokenContext>,
    signed: SignedCookieJar<AppKey>,
    plain: CookieJar,
) -> Response {
    let outcome = state.sessions.revoke_all(&token.claims.sub).await;

    let (signed, plain) = state.cookies.clear_all(signed, plain);
    match outcome {
        Ok(()) => (
            signed,
            plain,
            ApiResponse::ok("Signed out of every session."),
        )
            .into_response(),
        Err(err) => (signed, plain, err).into_response(),
    }
}

async fn revoke_session(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<TokenContext>,
    Path(session_token): Path<String>,
    signed: SignedCookieJar<AppKey>,
    plain: CookieJar,
) -> Result<Response> {
    // Scoped to the caller's user id; a foreign digest cannot match.
    state
        .sessions
        .revoke_one(&token.claims.sub, &session_token)
        .await?;

    if session_token == token.access_digest {
        // The caller revoked their own session.
        let (signed, plain) = state.cookies.clear_all(signed, plain);
        return Ok((signed, plain, ApiResponse::ok("Signed out.")).into_response());
    }

    Ok(ApiResponse::ok("Session revoked.").into_response())
}

async fn revoke_other_sessions(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<TokenContext>,
) -> Result<ApiResponse> {
    state
        .sessions
        .revoke_all_others(&token.claims.sub, &token.access_digest)
        .await?;

    Ok(ApiResponse::ok("Signed out of all other sessions."))
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<TokenContext>,
) -> Result<ApiResponse> {
    let user = state
        .users
        .find_by_id(&token.claims.sub)
        .await?
        .ok_or_else(AppError::session_expired)?;

    let mut sessions: Vec<Session> = user.sessions;
    sessions.sort_by(|a, b| b.logged_in_at.cmp(&a.logged_in_at));

    let current = token.access_digest;
    let listing: Vec<Value> = sessions
        .iter()
        .map(|s| {
            let mut value = serde_json::to_value(s).unwrap_or_default();
            value["current"] = json!(s.token == current);
            value
        })
        .collect();

    Ok(ApiResponse::ok("Sessions retrieved.").with_data(json!({ "sessions": listing })))
}

#[derive(Debug, Deserialize)]
struct MeQuery {
    /// Comma-separated projection, e.g. `?fields=email,role`
    fields: Option<String>,
}

async fn me(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<MeQuery>,
) -> Result<ApiResponse> {
    let mut value = serde_json::to_value(&user)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("profile encode failed: {e}")))?;

    // Default serialization already omits sensitive fields, so the
    // projection can only narrow further.
    if let Some(fields) = &query.fields {
        let keep: Vec<&str> = fields.split(',').map(str::trim).collect();
        if let Value::Object(map) = &mut value {
            map.retain(|key, _| keep.contains(&key.as_str()));
        }
    }

    Ok(ApiResponse::ok("Profile retrieved.").with_data(json!({ "user": value })))
}
