// SPDX-License-Identifier: MIT

//! In-memory user store for tests and single-node local development.

use super::{NewUser, UserStore};
use crate::crypto::{self, EncryptedPayload};
use crate::error::{AppError, Result};
use crate::models::{LinkedProvider, Session, TwoFa, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// DashMap-backed user store keyed by user id.
#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<String, User>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_user<T>(&self, user_id: &str, f: impl FnOnce(&mut User) -> T) -> Result<T> {
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        user.updated_at = Utc::now();
        Ok(f(&mut user))
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email_or_normalized(
        &self,
        email: &str,
        normalized: &str,
    ) -> Result<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|entry| entry.email == email || entry.normalized_email == normalized)
            .map(|entry| entry.clone()))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.users.get(id).map(|entry| entry.clone()))
    }

    async fn create(&self, new_user: NewUser) -> Result<User> {
        let duplicate = self.users.iter().any(|entry| {
            entry.email == new_user.email || entry.normalized_email == new_user.normalized_email
        });
        if duplicate {
            return Err(AppError::Conflict(
                "This email is already registered. Use a different email address.".to_string(),
            ));
        }

        let now = Utc::now();
        let user = User {
            id: crypto::random_hex_string(),
            family_name: new_user.family_name,
            given_name: new_user.given_name,
            email: new_user.email,
            normalized_email: new_user.normalized_email,
            phone: new_user.phone,
            role: new_user.role,
            verified: new_user.verified,
            avatar_url: new_user.avatar_url,
            two_fa: TwoFa::default(),
            password: new_user.password,
            auth: new_user.auth,
            sessions: Vec::new(),
            password_reset_token: None,
            password_reset_expires: None,
            created_at: now,
            updated_at: now,
        };

        self.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn push_session(&self, user_id: &str, session: Session) -> Result<()> {
        self.with_user(user_id, |user| user.sessions.push(session))
    }

    async fn update_session_token(
        &self,
        user_id: &str,
        old_digest: &str,
        new_digest: &str,
    ) -> Result<()> {
        self.with_user(user_id, |user| {
            // Zero matches is fine: a concurrent refresh may already have
            // rotated this element.
            if let Some(session) = user.sessions.iter_mut().find(|s| s.token == old_digest) {
                session.token = new_digest.to_string();
                session.last_activity_at = Utc::now();
            }
        })
    }

    async fn set_session_inactive(&self, user_id: &str, token_digest: &str) -> Result<()> {
        self.with_user(user_id, |user| {
            if let Some(session) = user.sessions.iter_mut().find(|s| s.token == token_digest) {
                session.status = false;
                session.revoked = true;
                session.revoked_at = Some(Utc::now());
            }
        })
    }

    async fn retain_session(&self, user_id: &str, keep_digest: &str) -> Result<()> {
        self.with_user(user_id, |user| {
            user.sessions.retain(|s| s.token == keep_digest);
        })
    }

    async fn unset_sessions(&self, user_id: &str) -> Result<()> {
        self.with_user(user_id, |user| user.sessions.clear())
    }

    async fn link_provider(&self, user_id: &str, provider: LinkedProvider) -> Result<()> {
        self.with_user(user_id, |user| {
            if !user.auth.iter().any(|p| p.provider == provider.provider) {
                user.auth.push(provider);
            }
        })
    }

    async fn enable_two_fa(&self, user_id: &str, secret: EncryptedPayload) -> Result<()> {
        self.with_user(user_id, |user| {
            user.two_fa = TwoFa {
                enabled: true,
                secret: Some(secret),
            };
        })
    }

    async fn set_password_reset(
        &self,
        user_id: &str,
        token_hash: &str,
        expires: DateTime<Utc>,
    ) -> Result<()> {
        self.with_user(user_id, |user| {
            user.password_reset_token = Some(token_hash.to_string());
            user.password_reset_expires = Some(expires);
        })
    }

    async fn find_by_reset_token(&self, token_hash: &str) -> Result<Option<User>> {
        let now = Utc::now();
        Ok(self
            .users
            .iter()
            .find(|entry| {
                entry.password_reset_token.as_deref() == Some(token_hash)
                    && entry.password_reset_expires.is_some_and(|exp| exp > now)
            })
            .map(|entry| entry.clone()))
    }

    async fn set_password(&self, user_id: &str, password_hash: &str) -> Result<()> {
        self.with_user(user_id, |user| {
            user.password = Some(password_hash.to_string());
            user.password_reset_token = None;
            user.password_reset_expires = None;
        })
    }
}
