// SPDX-License-Identifier: MIT

//! Session authentication middleware.
//!
//! Two gates run in order on protected routes. `validate_token` proves
//! the access cookie is a well-signed, unexpired JWT issued to this
//! device. `require_auth` then asks the session cache whether that token
//! is still live, so a revoked session dies immediately even though its
//! JWT has time left. Every failure de-authenticates: the response that
//! rejects the request also expires all token cookies.

use crate::cookies::ACCESS_COOKIE;
use crate::error::AppError;
use crate::fingerprint::RequestContext;
use crate::models::{Role, User};
use crate::tokens::TokenClaims;
use crate::{AppKey, AppState};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{CookieJar, SignedCookieJar};
use std::sync::Arc;

/// Verified token context inserted by [`validate_token`].
#[derive(Debug, Clone)]
pub struct TokenContext {
    pub claims: TokenClaims,
    /// HMAC digest of the presented access token; the cache key.
    pub access_digest: String,
}

/// Resolved account inserted by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

fn deauthenticate(
    state: &AppState,
    signed: SignedCookieJar<AppKey>,
    plain: CookieJar,
    err: AppError,
) -> Response {
    let (signed, plain) = state.cookies.clear_all(signed, plain);
    (signed, plain, err).into_response()
}

/// Verify the signed access cookie and its device binding.
pub async fn validate_token(
    State(state): State<Arc<AppState>>,
    signed: SignedCookieJar<AppKey>,
    plain: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let outcome = (|| {
        let cookie = signed
            .get(ACCESS_COOKIE)
            .ok_or_else(AppError::session_expired)?;
        let claims = state.tokens.verify_access(cookie.value())?;

        let ctx = RequestContext::from_headers(request.headers());
        if state.tokens.signature_mismatch(&claims, &ctx) {
            tracing::warn!(sub = %claims.sub, "Access token presented from a different device");
            return Err(AppError::session_expired());
        }

        Ok(TokenContext {
            access_digest: state.tokens.digest(cookie.value()),
            claims,
        })
    })();

    match outcome {
        Ok(token) => {
            request.extensions_mut().insert(token);
            next.run(request).await
        }
        Err(err) => deauthenticate(&state, signed, plain, err),
    }
}

/// Gate the request on cache liveness and resolve the current user.
/// Must run after [`validate_token`].
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    signed: SignedCookieJar<AppKey>,
    plain: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = request.extensions().get::<TokenContext>().cloned() else {
        return deauthenticate(&state, signed, plain, AppError::session_expired());
    };

    match state
        .sessions
        .is_live(&token.claims.sub, &token.access_digest)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            return deauthenticate(&state, signed, plain, AppError::session_expired());
        }
        Err(err) => return err.into_response(),
    }

    let user = match state.sessions.current_user(&token.claims.sub).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return deauthenticate(&state, signed, plain, AppError::session_expired());
        }
        Err(err) => return err.into_response(),
    };

    request.extensions_mut().insert(CurrentUser(user));
    next.run(request).await
}

/// Role gate for individual handlers.
pub fn restrict_to(user: &User, allowed: &[Role]) -> crate::error::Result<()> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}
