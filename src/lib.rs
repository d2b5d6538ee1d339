// SPDX-License-Identifier: MIT

//! Parceld: parcel-delivery backend — session & authentication core.
//!
//! This crate provides multi-provider login (password + OAuth),
//! device-bound session tokens held redundantly in a fast cache and a
//! durable session log, access/refresh/protect token rotation, TOTP
//! two-factor authentication and per-session revocation.

pub mod cache;
pub mod config;
pub mod cookies;
pub mod crypto;
pub mod error;
pub mod fingerprint;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;
pub mod services;
pub mod session;
pub mod store;
pub mod tokens;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use std::sync::Arc;

use cache::SessionCache;
use config::Config;
use cookies::CookiePolicy;
use services::{GeoService, Mailer, OAuthClient, TotpService};
use session::SessionManager;
use store::UserStore;
use tokens::TokenService;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub cookie_key: Key,
    pub cookies: CookiePolicy,
    pub tokens: TokenService,
    pub users: Arc<dyn UserStore>,
    pub cache: Arc<dyn SessionCache>,
    pub sessions: SessionManager,
    pub mailer: Arc<dyn Mailer>,
    pub geo: GeoService,
    pub oauth: OAuthClient,
    pub totp: TotpService,
}

impl AppState {
    /// Wire the state graph from a config plus the pluggable
    /// collaborators (store, cache, mailer, OAuth client).
    pub fn new(
        config: Config,
        users: Arc<dyn UserStore>,
        cache: Arc<dyn SessionCache>,
        mailer: Arc<dyn Mailer>,
        oauth: OAuthClient,
    ) -> Self {
        let tokens = TokenService::from_config(&config);
        let sessions = SessionManager::new(&config, tokens.clone(), users.clone(), cache.clone());

        Self {
            cookie_key: Key::derive_from(config.cookie_secret.as_bytes()),
            cookies: CookiePolicy::from_config(&config),
            totp: TotpService::new(config.totp_issuer.clone(), config.crypto_secret.clone()),
            geo: GeoService::from_config(&config),
            tokens,
            sessions,
            users,
            cache,
            mailer,
            oauth,
            config,
        }
    }
}

/// Cookie-signing key as extracted from the shared state. The signed
/// jars are parameterized over this wrapper (`SignedCookieJar<AppKey>`)
/// because `Key` itself is foreign and cannot implement `FromRef` for
/// our state type.
#[derive(Clone)]
pub struct AppKey(Key);

impl From<AppKey> for Key {
    fn from(key: AppKey) -> Key {
        key.0
    }
}

impl FromRef<Arc<AppState>> for AppKey {
    fn from_ref(state: &Arc<AppState>) -> AppKey {
        AppKey(state.cookie_key.clone())
    }
}
