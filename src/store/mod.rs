// SPDX-License-Identifier: MIT

//! Durable user store boundary.
//!
//! The auth core reaches the system of record only through [`UserStore`];
//! the backing database is an external collaborator. Session mutations
//! are expressed as the narrow operations the engine needs (append,
//! rotate-in-place, status flip, retain-one, unset) rather than
//! read-modify-write of the whole array.

pub mod memory;

use crate::crypto::EncryptedPayload;
use crate::error::Result;
use crate::models::{LinkedProvider, Role, Session, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryUserStore;

/// Payload for creating a user after email verification or from an
/// OAuth profile.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub family_name: String,
    pub given_name: String,
    pub email: String,
    pub normalized_email: String,
    pub phone: Option<String>,
    /// bcrypt hash; `None` for OAuth-only accounts
    pub password: Option<String>,
    pub role: Role,
    pub verified: bool,
    pub avatar_url: Option<String>,
    pub auth: Vec<LinkedProvider>,
}

/// Narrow durable-store interface consumed by the auth core.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find by raw email or normalized email, sensitive fields included.
    async fn find_by_email_or_normalized(&self, email: &str, normalized: &str)
        -> Result<Option<User>>;

    /// Find by id, sensitive fields included. Callers strip what they do
    /// not need; default serialization already hides sensitive fields.
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Create a user; enforces email/normalized-email uniqueness.
    async fn create(&self, new_user: NewUser) -> Result<User>;

    /// Append a session record to the user's durable log.
    async fn push_session(&self, user_id: &str, session: Session) -> Result<()>;

    /// Rotate in place: update the one session whose token equals
    /// `old_digest`. Zero matches is a silent no-op (concurrent refresh
    /// may have won the race), not an error.
    async fn update_session_token(
        &self,
        user_id: &str,
        old_digest: &str,
        new_digest: &str,
    ) -> Result<()>;

    /// Flip the matching session's `status` to false and stamp
    /// revocation; history is retained, not deleted.
    async fn set_session_inactive(&self, user_id: &str, token_digest: &str) -> Result<()>;

    /// Remove every session except the one matching `keep_digest`.
    async fn retain_session(&self, user_id: &str, keep_digest: &str) -> Result<()>;

    /// Unset the sessions array entirely.
    async fn unset_sessions(&self, user_id: &str) -> Result<()>;

    /// Link an identity provider if not already linked.
    async fn link_provider(&self, user_id: &str, provider: LinkedProvider) -> Result<()>;

    /// Persist the encrypted TOTP secret and set the enabled flag.
    async fn enable_two_fa(&self, user_id: &str, secret: EncryptedPayload) -> Result<()>;

    /// Store the hashed password-reset token and its expiry.
    async fn set_password_reset(
        &self,
        user_id: &str,
        token_hash: &str,
        expires: DateTime<Utc>,
    ) -> Result<()>;

    /// Find the user whose unexpired reset-token hash matches.
    async fn find_by_reset_token(&self, token_hash: &str) -> Result<Option<User>>;

    /// Replace the password hash and clear any pending reset token.
    async fn set_password(&self, user_id: &str, password_hash: &str) -> Result<()>;
}
