// SPDX-License-Identifier: MIT

//! Redis-backed session cache on a bb8 connection pool.
//!
//! Every logical action is one `MULTI`/`EXEC` pipeline.

use super::{session_key, SessionCache};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;

/// Redis session cache (connection-pooled).
pub struct RedisSessionCache {
    pool: Pool<RedisConnectionManager>,
}

impl RedisSessionCache {
    /// Connect and verify the server is reachable.
    pub async fn connect(url: &str) -> Result<Self> {
        let manager = RedisConnectionManager::new(url)
            .map_err(|e| AppError::Upstream(format!("Redis manager init failed: {e}")))?;

        let pool = Pool::builder()
            .max_size(16)
            .build(manager)
            .await
            .map_err(|e| AppError::Upstream(format!("Redis pool init failed: {e}")))?;

        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| AppError::Upstream(format!("Redis connection failed: {e}")))?;
            let _: String = conn
                .ping()
                .await
                .map_err(|e| AppError::Upstream(format!("Redis ping failed: {e}")))?;
        }

        tracing::info!(url, "Connected to Redis session cache");
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<bb8::PooledConnection<'_, RedisConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::Upstream(format!("Redis connection failed: {e}")))
    }
}

fn redis_err(e: redis::RedisError) -> AppError {
    AppError::Upstream(format!("Redis command failed: {e}"))
}

#[async_trait]
impl SessionCache for RedisSessionCache {
    async fn add_session(
        &self,
        user_id: &str,
        token_digest: &str,
        snapshot_json: &str,
        ttl_secs: i64,
    ) -> Result<()> {
        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .sadd(session_key(user_id), token_digest)
            .expire(session_key(user_id), ttl_secs)
            .set(user_id, snapshot_json)
            .expire(user_id, ttl_secs)
            .query_async::<()>(&mut *conn)
            .await
            .map_err(redis_err)
    }

    async fn rotate_session(
        &self,
        user_id: &str,
        old_digest: &str,
        new_digest: &str,
        ttl_secs: i64,
    ) -> Result<()> {
        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .srem(session_key(user_id), old_digest)
            .sadd(session_key(user_id), new_digest)
            .expire(session_key(user_id), ttl_secs)
            .query_async::<()>(&mut *conn)
            .await
            .map_err(redis_err)
    }

    async fn remove_session(&self, user_id: &str, token_digest: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let (removed,): (i64,) = redis::pipe()
            .atomic()
            .srem(session_key(user_id), token_digest)
            .query_async(&mut *conn)
            .await
            .map_err(redis_err)?;

        // An absent digest means the client presented a token that was
        // never (or no longer) live.
        if removed != 1 {
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
        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .del(session_key(user_id))
            .sadd(session_key(user_id), keep_digest)
            .expire(session_key(user_id), ttl_secs)
            .query_async::<()>(&mut *conn)
            .await
            .map_err(redis_err)
    }

    async fn purge(&self, user_id: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .del(session_key(user_id))
            .del(user_id)
            .query_async::<()>(&mut *conn)
            .await
            .map_err(redis_err)
    }

    async fn is_member(&self, user_id: &str, token_digest: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        conn.sismember(session_key(user_id), token_digest)
            .await
            .map_err(redis_err)
    }

    async fn get_snapshot(&self, user_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        conn.get(user_id).await.map_err(redis_err)
    }

    async fn put_snapshot(&self, user_id: &str, snapshot_json: &str, ttl_secs: i64) -> Result<()> {
        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .set(user_id, snapshot_json)
            .expire(user_id, ttl_secs)
            .query_async::<()>(&mut *conn)
            .await
            .map_err(redis_err)
    }
}
