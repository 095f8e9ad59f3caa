//! Write-through Redis cache for sessions, keyed `session:<uuid>`. Reads by
//! external alias always miss the cache and fall through to Postgres —
//! the cache indexes the canonical identifier only, matching SPEC_FULL.md
//! §6's documented key layout.

use meridian_core::session::Session;
use redis::AsyncCommands;

fn key(id: &str) -> String {
    format!("session:{id}")
}

#[derive(Clone)]
pub struct SessionCache {
    redis: redis::aio::ConnectionManager,
}

impl SessionCache {
    pub fn new(redis: redis::aio::ConnectionManager) -> Self {
        Self { redis }
    }

    pub async fn get(&self, id_or_alias: &str) -> Option<Session> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(key(id_or_alias)).await.ok()?;
        raw.and_then(|s| serde_json::from_str(&s).ok())
    }

    /// Initial population of a freshly read/created row; sets the TTL from
    /// the session's own `expires_at`.
    pub async fn put(&self, session: &Session) {
        let Ok(payload) = serde_json::to_string(session) else {
            return;
        };
        let ttl_secs = (session.expires_at - chrono::Utc::now()).num_seconds().max(1) as u64;
        let mut conn = self.redis.clone();
        let _: Result<(), _> = conn.set_ex(key(&session.id.to_string()), payload, ttl_secs).await;
    }

    /// Refresh after a mutation, preserving whatever TTL is already set
    /// (`KEEPTTL`) rather than resetting it from `expires_at` again — an
    /// unrelated field update must not silently extend a session's life.
    pub async fn put_keep_ttl(&self, session: &Session) {
        let Ok(payload) = serde_json::to_string(session) else {
            return;
        };
        let mut conn = self.redis.clone();
        let _: Result<(), _> = redis::cmd("SET")
            .arg(key(&session.id.to_string()))
            .arg(payload)
            .arg("KEEPTTL")
            .query_async(&mut conn)
            .await;
    }

    pub async fn invalidate(&self, id_or_alias: &str) {
        let mut conn = self.redis.clone();
        let _: Result<(), _> = conn.del(key(id_or_alias)).await;
    }
}
