// SPDX-License-Identifier: MIT

//! Shared test harness: an in-process app with in-memory store/cache, a
//! recording mailer (so tests can read the OTP they must submit) and a
//! cookie store that round-trips Set-Cookie headers like a browser.

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use parceld::config::Config;
use parceld::cache::MemorySessionCache;
use parceld::models::OAuthProfile;
use parceld::routes::create_router;
use parceld::services::{OAuthClient, RecordingMailer};
use parceld::store::MemoryUserStore;
use parceld::AppState;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

#[allow(dead_code)]
pub const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
#[allow(dead_code)]
pub const FIREFOX_MAC: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:127.0) Gecko/20100101 Firefox/127.0";

pub const CLIENT_IP: &str = "203.0.113.7";

/// In-process app plus the collaborators tests need to observe.
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub mailer: Arc<RecordingMailer>,
    cookies: HashMap<String, String>,
}

#[allow(dead_code)]
impl TestApp {
    pub fn new() -> Self {
        Self::with_oauth(OAuthClient::new_mock(default_oauth_profile()))
    }

    pub fn with_oauth(oauth: OAuthClient) -> Self {
        let mailer = Arc::new(RecordingMailer::new());
        let state = Arc::new(AppState::new(
            Config::test_default(),
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemorySessionCache::new()),
            mailer.clone(),
            oauth,
        ));

        Self {
            router: create_router(state.clone()),
            state,
            mailer,
            cookies: HashMap::new(),
        }
    }

    /// Issue a request with the default device fingerprint, updating the
    /// cookie store from the response.
    pub async fn request(
        &mut self,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        self.request_as(CHROME_WIN, method, uri, body).await
    }

    /// Same as [`request`] but presenting a different User-Agent.
    pub async fn request_as(
        &mut self,
        user_agent: &str,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::USER_AGENT, user_agent)
            .header("x-forwarded-for", CLIENT_IP);

        if !self.cookies.is_empty() {
            let jar: Vec<&str> = self.cookies.values().map(String::as_str).collect();
            builder = builder.header(header::COOKIE, jar.join("; "));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        self.absorb_cookies(&response);
        response
    }

    /// Apply Set-Cookie headers the way a browser would.
    fn absorb_cookies(&mut self, response: &Response<Body>) {
        for value in response.headers().get_all(header::SET_COOKIE) {
            let raw = value.to_str().unwrap();
            let pair = raw.split(';').next().unwrap().trim();
            let (name, val) = pair.split_once('=').unwrap();

            if val.is_empty() || raw.contains("Max-Age=0") {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_string(), pair.to_string());
            }
        }
    }

    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    pub fn clear_cookies(&mut self) {
        self.cookies.clear();
    }

    /// Snapshot the cookie store, so one test can juggle several
    /// "browsers" against the same backend.
    pub fn save_cookies(&self) -> HashMap<String, String> {
        self.cookies.clone()
    }

    pub fn load_cookies(&mut self, cookies: HashMap<String, String>) {
        self.cookies = cookies;
    }

    /// Overwrite one cookie slot with an arbitrary value.
    pub fn set_cookie(&mut self, name: &str, value: &str) {
        self.cookies
            .insert(name.to_string(), format!("{name}={value}"));
    }

    /// The 6-digit code from the most recent mail.
    pub fn latest_otp(&self) -> String {
        let sent = self.mailer.sent();
        let body = &sent.last().expect("no mail sent").body;
        body.split(|c: char| !c.is_ascii_digit())
            .find(|chunk| chunk.len() == 6)
            .expect("no OTP in mail body")
            .to_string()
    }

    /// Run the full signup + email-verification flow.
    pub async fn signup_and_verify(&mut self, email: &str, password: &str) -> Value {
        let response = self
            .request(
                "POST",
                "/api/v1/auth/signup",
                Some(serde_json::json!({
                    "family_name": "Lovelace",
                    "given_name": "Ada",
                    "email": email,
                    "password": password,
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let token = body["data"]["token"].as_str().unwrap().to_string();

        let otp = self.latest_otp();
        let response = self
            .request(
                "POST",
                "/api/v1/auth/verify-email",
                Some(serde_json::json!({ "token": token, "otp": otp })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    /// Sign in with password credentials.
    pub async fn signin(&mut self, email: &str, password: &str, remember: bool) -> Response<Body> {
        self.request(
            "POST",
            "/api/v1/auth/signin",
            Some(serde_json::json!({
                "email": email,
                "password": password,
                "remember": remember,
            })),
        )
        .await
    }
}

#[allow(dead_code)]
pub fn default_oauth_profile() -> OAuthProfile {
    OAuthProfile {
        email: "oauth.user@example.com".to_string(),
        verified: true,
        family_name: "Lovelace".to_string(),
        given_name: "Ada".to_string(),
        avatar_url: Some("https://avatars.example/ada".to_string()),
    }
}

/// Parse a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    use http_body_util::BodyExt;
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// Compute the current TOTP code for a base32 secret.
#[allow(dead_code)]
pub fn totp_code(secret_base32: &str) -> String {
    use totp_rs::{Algorithm, Secret, TOTP};

    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        Secret::Encoded(secret_base32.to_string()).to_bytes().unwrap(),
        Some("Parceld".to_string()),
        "test@example.com".to_string(),
    )
    .unwrap();
    totp.generate_current().unwrap()
}
