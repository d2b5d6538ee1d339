// SPDX-License-Identifier: MIT

//! Refresh-token rotation and replay-defense tests.

use axum::http::{header, StatusCode};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use parceld::cookies::{ACCESS_COOKIE, PENDING_2FA_COOKIE, PROTECT_COOKIE, REFRESH_COOKIE};
use serde_json::json;

mod common;

use common::{body_json, TestApp, CHROME_WIN, FIREFOX_MAC};

const EMAIL: &str = "ada@example.com";
const PASSWORD: &str = "correct horse battery";

#[tokio::test]
async fn test_refresh_rotates_the_session_digest() {
    let mut app = TestApp::new();
    app.signup_and_verify(EMAIL, PASSWORD).await;
    app.signin(EMAIL, PASSWORD, true).await;

    let response = app.request("GET", "/api/v1/auth/sessions", None).await;
    let before = body_json(response).await["data"]["sessions"][0]["token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app.request("POST", "/api/v1/auth/refresh-token", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["role"], "customer");

    // The new access cookie authenticates and maps to a new digest.
    let response = app.request("GET", "/api/v1/auth/sessions", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let sessions = body_json(response).await["data"]["sessions"].clone();
    assert_eq!(sessions.as_array().unwrap().len(), 1);
    assert_ne!(sessions[0]["token"].as_str().unwrap(), before);
    assert_eq!(sessions[0]["current"], true);
}

#[tokio::test]
async fn test_expired_refresh_token_clears_every_cookie() {
    let mut app = TestApp::new();

    // Well-signed but already expired.
    let now = Utc::now().timestamp();
    let claims = json!({
        "sub": "u1",
        "role": "customer",
        "ip": "x",
        "device": "x",
        "browser": "x",
        "remember": false,
        "token": "digest",
        "jti": "0000",
        "iat": now - 600,
        "exp": now - 60,
    });
    let expired = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"test_refresh_secret"),
    )
    .unwrap();

    app.set_cookie(REFRESH_COOKIE, &expired);
    let response = app.request("POST", "/api/v1/auth/refresh-token", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // All four slots are expired on the client.
    let cleared: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    for name in [ACCESS_COOKIE, REFRESH_COOKIE, PROTECT_COOKIE, PENDING_2FA_COOKIE] {
        assert!(
            cleared
                .iter()
                .any(|c| c.starts_with(&format!("{name}=")) && c.contains("Max-Age=0")),
            "missing removal for {name}"
        );
    }
}

#[tokio::test]
async fn test_device_mismatch_blocks_refresh() {
    let mut app = TestApp::new();
    app.signup_and_verify(EMAIL, PASSWORD).await;
    app.signin(EMAIL, PASSWORD, true).await;

    // Same cookies, different browser/OS fingerprint.
    let response = app
        .request_as(FIREFOX_MAC, "POST", "/api/v1/auth/refresh-token", None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!app.has_cookie(REFRESH_COOKIE));
    assert!(!app.has_cookie(ACCESS_COOKIE));

    // The replay attempt did not rotate the session away from the
    // legitimate device... which was de-authenticated anyway.
    let response = app
        .request_as(CHROME_WIN, "GET", "/api/v1/users/me", None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_revoked_session_cannot_be_revived_by_refresh() {
    let mut app = TestApp::new();
    app.signup_and_verify(EMAIL, PASSWORD).await;
    app.signin(EMAIL, PASSWORD, true).await;

    let stolen = app.save_cookies();

    let response = app.request("POST", "/api/v1/auth/signout", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    // The refresh token from before the signout is still a valid JWT,
    // but its session is no longer live.
    app.load_cookies(stolen);
    let response = app.request("POST", "/api/v1/auth/refresh-token", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_without_cookie_rejected() {
    let mut app = TestApp::new();
    let response = app.request("POST", "/api/v1/auth/refresh-token", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
