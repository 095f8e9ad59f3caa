//! Redis-backed persistence for [`ReviewState`], independent of the Session
//! Store's cache (separate key space, separate TTL): a review session
//! outlives any one `GetSessionContext` call and is never read through the
//! session cache's dual-id resolution.

use meridian_core::error::{CoreError, Result};
use meridian_core::review::ReviewState;
use redis::AsyncCommands;

const TTL_SECS: u64 = 60 * 60;

fn key(workflow_id: &str) -> String {
    format!("review:{workflow_id}")
}

#[derive(Clone)]
pub struct ReviewStore {
    redis: redis::aio::ConnectionManager,
}

impl ReviewStore {
    pub fn new(redis: redis::aio::ConnectionManager) -> Self {
        Self { redis }
    }

    pub async fn get(&self, workflow_id: &str) -> Result<Option<ReviewState>> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn
            .get(key(workflow_id))
            .await
            .map_err(|e| CoreError::Unavailable(format!("review store read: {e}")))?;
        match raw {
            None => Ok(None),
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        }
    }

    /// Writes (or re-writes) the review state with a fresh 60-minute TTL —
    /// each turn extends the session's life rather than racing a fixed
    /// expiry set at creation.
    pub async fn put(&self, state: &ReviewState) -> Result<()> {
        let payload = serde_json::to_string(state)?;
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(key(&state.workflow_id), payload, TTL_SECS)
            .await
            .map_err(|e| CoreError::Unavailable(format!("review store write: {e}")))?;
        Ok(())
    }
}
