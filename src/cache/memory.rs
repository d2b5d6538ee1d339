// SPDX-License-Identifier: MIT

//! In-memory session cache for tests and single-node local development.
//!
//! Each trait method takes the relevant map entry once, so one logical
//! action is applied atomically with respect to concurrent readers. TTLs
//! are tracked as absolute deadlines and checked lazily on read.

use super::{session_key, SessionCache};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashSet;

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    deadline: DateTime<Utc>,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl_secs: i64) -> Self {
        Self {
            value,
            deadline: Utc::now() + Duration::seconds(ttl_secs),
        }
    }

    fn live(&self) -> bool {
        Utc::now() < self.deadline
    }
}

/// DashMap-backed session cache.
#[derive(Default)]
pub struct MemorySessionCache {
    sets: DashMap<String, Expiring<HashSet<String>>>,
    snapshots: DashMap<String, Expiring<String>>,
}

impl MemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionCache for MemorySessionCache {
    async fn add_session(
        &self,
        user_id: &str,
        token_digest: &str,
        snapshot_json: &str,
        ttl_secs: i64,
    ) -> Result<()> {
        let key = session_key(user_id);
        let mut entry = self
            .sets
            .entry(key)
            .or_insert_with(|| Expiring::new(HashSet::new(), ttl_secs));
        entry.value.insert(token_digest.to_string());
        entry.deadline = Utc::now() + Duration::seconds(ttl_secs);
        drop(entry);

        self.snapshots.insert(
            user_id.to_string(),
            Expiring::new(snapshot_json.to_string(), ttl_secs),
        );
        Ok(())
    }

    async fn rotate_session(
        &self,
        user_id: &str,
        old_digest: &str,
        new_digest: &str,
        ttl_secs: i64,
    ) -> Result<()> {
        let key = session_key(user_id);
        let mut entry = self
            .sets
            .entry(key)
            .or_insert_with(|| Expiring::new(HashSet::new(), ttl_secs));
        entry.value.remove(old_digest);
        entry.value.insert(new_digest.to_string());
        entry.deadline = Utc::now() + Duration::seconds(ttl_secs);
        Ok(())
    }

    async fn remove_session(&self, user_id: &str, token_digest: &str) -> Result<()> {
        let key = session_key(user_id);
        let removed = self
            .sets
            .get_mut(&key)
            .map(|mut entry| entry.value.remove(token_digest))
            .unwrap_or(false);

        if !removed {
            return Err(AppError::session_expired());
        }
        Ok(())
    }

    async fn replace_sessions(
        &self,
        user_id: &str,
        keep_digest: &str,
        ttl_secs: i64,
    ) -> Result<()> {
        let mut set = HashSet::new();
        set.insert(keep_digest.to_string());
        self.sets
            .insert(session_key(user_id), Expiring::new(set, ttl_secs));
        Ok(())
    }

    async fn purge(&self, user_id: &str) -> Result<()> {
        self.sets.remove(&session_key(user_id));
        self.snapshots.remove(user_id);
        Ok(())
    }

    async fn is_member(&self, user_id: &str, token_digest: &str) -> Result<bool> {
        Ok(self
            .sets
            .get(&session_key(user_id))
            .map(|entry| entry.live() && entry.value.contains(token_digest))
            .unwrap_or(false))
    }

    async fn get_snapshot(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self
            .snapshots
            .get(user_id)
            .filter(|entry| entry.live())
            .map(|entry| entry.value.clone()))
    }

    async fn put_snapshot(&self, user_id: &str, snapshot_json: &str, ttl_secs: i64) -> Result<()> {
        self.snapshots.insert(
            user_id.to_string(),
            Expiring::new(snapshot_json.to_string(), ttl_secs),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_and_membership() {
        let cache = MemorySessionCache::new();
        cache.add_session("u1", "d1", "{}", 60).await.unwrap();

        assert!(cache.is_member("u1", "d1").await.unwrap());
        assert!(!cache.is_member("u1", "d2").await.unwrap());
        assert!(!cache.is_member("u2", "d1").await.unwrap());
        assert_eq!(cache.get_snapshot("u1").await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_rotate_swaps_digest() {
        let cache = MemorySessionCache::new();
        cache.add_session("u1", "old", "{}", 60).await.unwrap();
        cache.rotate_session("u1", "old", "new", 60).await.unwrap();

        assert!(!cache.is_member("u1", "old").await.unwrap());
        assert!(cache.is_member("u1", "new").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_absent_digest_is_error() {
        let cache = MemorySessionCache::new();
        cache.add_session("u1", "d1", "{}", 60).await.unwrap();

        assert!(cache.remove_session("u1", "missing").await.is_err());
        // First removal succeeds, replay of the same removal fails.
        cache.remove_session("u1", "d1").await.unwrap();
        assert!(cache.remove_session("u1", "d1").await.is_err());
    }

    #[tokio::test]
    async fn test_replace_keeps_only_one() {
        let cache = MemorySessionCache::new();
        cache.add_session("u1", "a", "{}", 60).await.unwrap();
        cache.add_session("u1", "b", "{}", 60).await.unwrap();
        cache.add_session("u1", "c", "{}", 60).await.unwrap();

        cache.replace_sessions("u1", "b", 60).await.unwrap();

        assert!(!cache.is_member("u1", "a").await.unwrap());
        assert!(cache.is_member("u1", "b").await.unwrap());
        assert!(!cache.is_member("u1", "c").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_clears_set_and_snapshot() {
        let cache = MemorySessionCache::new();
        cache.add_session("u1", "d1", "{}", 60).await.unwrap();
        cache.purge("u1").await.unwrap();

        assert!(!cache.is_member("u1", "d1").await.unwrap());
        assert!(cache.get_snapshot("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_not_served() {
        let cache = MemorySessionCache::new();
        cache.add_session("u1", "d1", "{}", -1).await.unwrap();

        assert!(!cache.is_member("u1", "d1").await.unwrap());
        assert!(cache.get_snapshot("u1").await.unwrap().is_none());
    }
}
