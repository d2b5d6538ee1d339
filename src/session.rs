// SPDX-License-Identifier: MIT

//! Session engine: the single writer for session state.
//!
//! Every session mutation goes through [`SessionManager`] and lands in
//! both tiers in the same call: the cache (request-time authority) and
//! the durable session log (audit/history). Tokens never touch either
//! tier raw; only their HMAC digests do.

use crate::cache::SessionCache;
use crate::config::Config;
use crate::error::Result;
use crate::fingerprint::RequestContext;
use crate::models::{Session, User};
use crate::store::UserStore;
use crate::tokens::{TokenService, TokenTriple};
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Coordinates token issuance with the cache and durable session log.
pub struct SessionManager {
    tokens: TokenService,
    users: Arc<dyn UserStore>,
    cache: Arc<dyn SessionCache>,
    refresh_ttl_days: i64,
}

impl SessionManager {
    pub fn new(
        config: &Config,
        tokens: TokenService,
        users: Arc<dyn UserStore>,
        cache: Arc<dyn SessionCache>,
    ) -> Self {
        Self {
            tokens,
            users,
            cache,
            refresh_ttl_days: config.refresh_ttl_days,
        }
    }

    /// Cache entries live exactly as long as the refresh token that could
    /// revive them.
    fn cache_ttl_secs(&self) -> i64 {
        self.refresh_ttl_days * 86_400
    }

    /// Serialize the cacheable user snapshot. Default serialization
    /// already strips sensitive fields.
    fn snapshot(user: &User) -> Result<String> {
        serde_json::to_string(user)
            .map_err(|e| anyhow::anyhow!("snapshot encode failed: {e}").into())
    }

    /// Mint a token triple for `user` and record the new session in both
    /// tiers. This is the only path that creates a session.
    pub async fn open(
        &self,
        ctx: &RequestContext,
        user: &User,
        remember: bool,
    ) -> Result<TokenTriple> {
        let triple = self
            .tokens
            .issue_triple(ctx, &user.id, user.role, remember)?;
        let digest = self.tokens.digest(&triple.access);

        let now = Utc::now();
        let record = Session {
            token: digest.clone(),
            device_info: ctx.device.clone(),
            location: ctx.location.clone(),
            ip: ctx.ip.clone(),
            logged_in_at: now,
            expires_at: now + Duration::days(self.refresh_ttl_days),
            revoked: false,
            revoked_at: None,
            last_activity_at: now,
            status: true,
        };

        self.users.push_session(&user.id, record).await?;
        self.cache
            .add_session(&user.id, &digest, &Self::snapshot(user)?, self.cache_ttl_secs())
            .await?;

        Ok(triple)
    }

    /// Rotate the session identified by `old_digest` into a fresh triple.
    /// The durable update matches zero elements when a concurrent refresh
    /// already rotated; the cache swap is still applied so the newest
    /// access token is live either way.
    pub async fn rotate(
        &self,
        ctx: &RequestContext,
        user: &User,
        old_digest: &str,
        remember: bool,
    ) -> Result<TokenTriple> {
        let triple = self
            .tokens
            .issue_triple(ctx, &user.id, user.role, remember)?;
        let new_digest = self.tokens.digest(&triple.access);

        self.cache
            .rotate_session(&user.id, old_digest, &new_digest, self.cache_ttl_secs())
            .await?;
        self.users
            .update_session_token(&user.id, old_digest, &new_digest)
            .await?;

        Ok(triple)
    }

    /// Revoke exactly one session. The cache removal is the authority: an
    /// absent digest surfaces as an expired-session error before the
    /// durable log is touched. The durable record keeps its history with
    /// `status` flipped off.
    pub async fn revoke_one(&self, user_id: &str, token_digest: &str) -> Result<()> {
        self.cache.remove_session(user_id, token_digest).await?;
        self.users.set_session_inactive(user_id, token_digest).await?;
        Ok(())
    }

    /// Revoke every session except the caller's own.
    pub async fn revoke_all_others(&self, user_id: &str, keep_digest: &str) -> Result<()> {
        self.cache
            .replace_sessions(user_id, keep_digest, self.cache_ttl_secs())
            .await?;
        self.users.retain_session(user_id, keep_digest).await?;
        Ok(())
    }

    /// Revoke everything, the caller's session included.
    pub async fn revoke_all(&self, user_id: &str) -> Result<()> {
        self.cache.purge(user_id).await?;
        self.users.unset_sessions(user_id).await?;
        Ok(())
    }

    /// True when the digest is live in the cache.
    pub async fn is_live(&self, user_id: &str, token_digest: &str) -> Result<bool> {
        self.cache.is_member(user_id, token_digest).await
    }

    /// Resolve the current user from the cached snapshot. The snapshot
    /// is as authoritative as the digest set: absent or unreadable means
    /// the session was revoked or the cache evicted, and the caller
    /// de-authenticates rather than falling back to the durable store.
    pub async fn current_user(&self, user_id: &str) -> Result<Option<User>> {
        let Some(json) = self.cache.get_snapshot(user_id).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&json).ok())
    }

    /// Rewrite the cached snapshot after a profile-affecting change.
    pub async fn refresh_snapshot(&self, user: &User) -> Result<()> {
        self.cache
            .put_snapshot(&user.id, &Self::snapshot(user)?, self.cache_ttl_secs())
            .await
    }
}
