// SPDX-License-Identifier: MIT

//! Fast session cache: per-user set of live access-token digests plus a
//! denormalized user snapshot, both with TTLs.
//!
//! The cache is the request-time authority for "is this access token
//! currently live"; the durable session log is audit/history. All
//! sub-operations of one logical action are issued as a single atomic
//! batch so a crash cannot leave the set and its TTL out of sync.

pub mod memory;
pub mod redis;

use crate::error::Result;
use async_trait::async_trait;

pub use memory::MemorySessionCache;
pub use redis::RedisSessionCache;

/// Set-membership session cache keyed by user id.
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Add a token digest to the user's session set and refresh the user
    /// snapshot, one atomic batch.
    async fn add_session(
        &self,
        user_id: &str,
        token_digest: &str,
        snapshot_json: &str,
        ttl_secs: i64,
    ) -> Result<()>;

    /// Swap `old_digest` for `new_digest` and refresh the set TTL.
    async fn rotate_session(
        &self,
        user_id: &str,
        old_digest: &str,
        new_digest: &str,
        ttl_secs: i64,
    ) -> Result<()>;

    /// Remove one digest. A digest that was not present is an error (it
    /// indicates stale client state), not a silent no-op.
    async fn remove_session(&self, user_id: &str, token_digest: &str) -> Result<()>;

    /// Replace the whole set with only `keep_digest`.
    async fn replace_sessions(&self, user_id: &str, keep_digest: &str, ttl_secs: i64)
        -> Result<()>;

    /// Delete the session set and the user snapshot.
    async fn purge(&self, user_id: &str) -> Result<()>;

    /// Membership test for the per-request auth gate.
    async fn is_member(&self, user_id: &str, token_digest: &str) -> Result<bool>;

    /// Fetch the cached user snapshot, if any.
    async fn get_snapshot(&self, user_id: &str) -> Result<Option<String>>;

    /// Store the user snapshot with a TTL.
    async fn put_snapshot(&self, user_id: &str, snapshot_json: &str, ttl_secs: i64) -> Result<()>;
}

/// Session-set key for a user.
pub(crate) fn session_key(user_id: &str) -> String {
    format!("{user_id}:session")
}
