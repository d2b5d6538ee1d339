// SPDX-License-Identifier: MIT

//! Request-gate tests: cookie validation, profile projection, CORS and
//! security headers.

use axum::http::{header, StatusCode};
use parceld::cookies::ACCESS_COOKIE;

mod common;

use common::{body_json, TestApp};

const EMAIL: &str = "ada@example.com";
const PASSWORD: &str = "correct horse battery";

#[tokio::test]
async fn test_health_check() {
    let mut app = TestApp::new();
    let response = app.request("GET", "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_protected_route_without_cookies() {
    let mut app = TestApp::new();
    let response = app.request("GET", "/api/v1/users/me", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(body["status"], "fail");
}

#[tokio::test]
async fn test_forged_access_cookie_rejected_and_cleared() {
    let mut app = TestApp::new();

    // Unsigned value fails the signed-jar check outright.
    app.set_cookie(ACCESS_COOKIE, "forged-token-value");
    let response = app.request("GET", "/api/v1/users/me", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let removals = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter(|v| v.to_str().unwrap().contains("Max-Age=0"))
        .count();
    assert_eq!(removals, 4);
    assert!(!app.has_cookie(ACCESS_COOKIE));
}

#[tokio::test]
async fn test_evicted_snapshot_deauthenticates() {
    use parceld::cache::SessionCache as _;

    let mut app = TestApp::new();
    app.signup_and_verify(EMAIL, PASSWORD).await;
    let response = app.signin(EMAIL, PASSWORD, false).await;
    let user_id = body_json(response).await["data"]["user"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    // Expire only the snapshot; the digest set still holds the token.
    app.state
        .cache
        .put_snapshot(&user_id, "{}", -1)
        .await
        .unwrap();

    let response = app.request("GET", "/api/v1/users/me", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!app.has_cookie(ACCESS_COOKIE));
}

#[tokio::test]
async fn test_me_profile_hides_sensitive_fields() {
    let mut app = TestApp::new();
    app.signup_and_verify(EMAIL, PASSWORD).await;
    app.signin(EMAIL, PASSWORD, false).await;

    let response = app.request("GET", "/api/v1/users/me", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let user = body_json(response).await["data"]["user"].clone();
    assert_eq!(user["email"], EMAIL);
    assert!(user.get("password").is_none());
    assert!(user.get("sessions").is_none());
    assert!(user.get("auth").is_none());
    assert!(user["two_fa"].get("secret").is_none());
}

#[tokio::test]
async fn test_me_field_projection() {
    let mut app = TestApp::new();
    app.signup_and_verify(EMAIL, PASSWORD).await;
    app.signin(EMAIL, PASSWORD, false).await;

    let response = app
        .request("GET", "/api/v1/users/me?fields=email,role", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let user = body_json(response).await["data"]["user"].clone();
    let keys: Vec<&String> = user.as_object().unwrap().keys().collect();
    assert_eq!(keys.len(), 2);
    assert_eq!(user["email"], EMAIL);
    assert_eq!(user["role"], "customer");
}

#[tokio::test]
async fn test_cors_preflight_allows_frontend_origin() {
    let mut app = TestApp::new();

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/v1/auth/signin")
        .header(header::ORIGIN, "http://localhost:3001")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:3001"
    );
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .unwrap(),
        "true"
    );
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let mut app = TestApp::new();
    let response = app.request("GET", "/health", None).await;

    let headers = response.headers();
    assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
    assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
}
