// SPDX-License-Identifier: MIT

//! Cookie policy for the four token slots.
//!
//! Access and pending-2FA cookies are signed (tamper-evident) and
//! HTTP-only; refresh is HTTP-only; protect is readable by the client so
//! the frontend can show session-state hints without touching the access
//! token. "Remember me" sets an explicit Max-Age, otherwise the cookie is
//! session-scoped — the JWT's own expiry claim is unaffected either way.

use crate::config::Config;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite, SignedCookieJar};
use time::Duration;

// Opaque slot names; stable across deployments.
pub const ACCESS_COOKIE: &str = "pd91fe7";
pub const REFRESH_COOKIE: &str = "pd92be3";
pub const PROTECT_COOKIE: &str = "pd93cd4";
pub const PENDING_2FA_COOKIE: &str = "pd93cd5";

/// Logical cookie slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieKind {
    Access,
    Refresh,
    Protect,
    Pending2fa,
}

impl CookieKind {
    pub fn name(self) -> &'static str {
        match self {
            CookieKind::Access => ACCESS_COOKIE,
            CookieKind::Refresh => REFRESH_COOKIE,
            CookieKind::Protect => PROTECT_COOKIE,
            CookieKind::Pending2fa => PENDING_2FA_COOKIE,
        }
    }

    /// Signed cookies ride the signed jar; the rest ride the plain jar.
    pub fn signed(self) -> bool {
        matches!(self, CookieKind::Access | CookieKind::Pending2fa)
    }
}

/// Builds cookies for each slot with the configured lifetimes.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    access_ttl: Duration,
    refresh_ttl: Duration,
    protect_ttl: Duration,
    pending_ttl: Duration,
}

impl CookiePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            access_ttl: Duration::minutes(config.access_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_ttl_days),
            protect_ttl: Duration::days(config.protect_ttl_days),
            pending_ttl: Duration::minutes(5),
        }
    }

    fn ttl(&self, kind: CookieKind) -> Duration {
        match kind {
            CookieKind::Access => self.access_ttl,
            CookieKind::Refresh => self.refresh_ttl,
            CookieKind::Protect => self.protect_ttl,
            CookieKind::Pending2fa => self.pending_ttl,
        }
    }

    /// Build a cookie for `kind`. `remember` persists it with an explicit
    /// Max-Age; otherwise it is a session cookie.
    pub fn build(&self, kind: CookieKind, value: String, remember: bool) -> Cookie<'static> {
        let mut cookie = Cookie::build((kind.name(), value))
            .path("/")
            .secure(true)
            .same_site(SameSite::None)
            .http_only(kind != CookieKind::Protect)
            .build();

        if remember {
            cookie.set_max_age(self.ttl(kind));
        }

        cookie
    }

    /// Build a removal cookie that expires the slot on the client.
    pub fn removal(&self, kind: CookieKind) -> Cookie<'static> {
        let mut cookie = self.build(kind, String::new(), false);
        cookie.set_max_age(Duration::ZERO);
        cookie.make_removal();
        cookie
    }

    /// Expire every slot in one response. The single point of "fail safe
    /// by de-authenticating": used on signout and on every
    /// token-validation failure.
    pub fn clear_all<K>(
        &self,
        signed: SignedCookieJar<K>,
        plain: CookieJar,
    ) -> (SignedCookieJar<K>, CookieJar) {
        let signed = signed
            .add(self.removal(CookieKind::Access))
            .add(self.removal(CookieKind::Pending2fa));
        let plain = plain
            .add(self.removal(CookieKind::Refresh))
            .add(self.removal(CookieKind::Protect));
        (signed, plain)
    }
}
