//! C3: the Session Store. Postgres is the system of record; Redis is a
//! write-through cache keyed by `session:<uuid>`, with the external alias
//! (when present) resolved through the same cache key rather than a
//! separate one, so invalidation on delete only ever has to reason about
//! the canonical id plus whatever alias the caller supplies.

mod cache;
mod rows;

use std::collections::HashMap;

use chrono::Duration;
use meridian_core::error::{CoreError, Result};
use meridian_core::session::{Message, Session};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct SessionStore {
    pool: PgPool,
    cache: cache::SessionCache,
}

impl SessionStore {
    pub fn new(pool: PgPool, redis: redis::aio::ConnectionManager) -> Self {
        Self {
            pool,
            cache: cache::SessionCache::new(redis),
        }
    }

    /// Resolves by canonical UUID or by `context->>'external_id'`.
    /// Soft-deleted sessions never resolve.
    pub async fn get(&self, id_or_alias: &str) -> Result<Option<Session>> {
        if let Some(session) = self.cache.get(id_or_alias).await {
            if !session.is_deleted() {
                return Ok(Some(session));
            }
        }

        let row = if let Ok(uuid) = Uuid::parse_str(id_or_alias) {
            sqlx::query_as::<_, rows::SessionRow>(
                "SELECT * FROM sessions WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, rows::SessionRow>(
                "SELECT * FROM sessions WHERE context->>'external_id' = $1 AND deleted_at IS NULL",
            )
            .bind(id_or_alias)
            .fetch_optional(&self.pool)
            .await
        }
        .map_err(|e| CoreError::Database(format!("fetch session: {e}")))?;

        match row {
            None => Ok(None),
            Some(row) => {
                let session = row.into_domain()?;
                self.cache.put(&session).await;
                Ok(Some(session))
            }
        }
    }

    pub async fn create(
        &self,
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Result<Session> {
        self.create_with_id(Uuid::new_v4(), user_id, tenant_id, context).await
    }

    pub async fn create_with_id(
        &self,
        id: Uuid,
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Result<Session> {
        let mut session = Session::with_id(id, user_id, tenant_id, default_ttl());
        session.context = context;
        self.persist_new(&session).await?;
        self.cache.put(&session).await;
        Ok(session)
    }

    async fn persist_new(&self, session: &Session) -> Result<()> {
        let context = serde_json::to_value(&session.context)?;
        let history = serde_json::to_value(&session.history)?;
        sqlx::query(
            r#"
            INSERT INTO sessions
                (id, user_id, tenant_id, context, history, token_budget, tokens_used,
                 created_at, updated_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(session.id)
        .bind(&session.user_id)
        .bind(&session.tenant_id)
        .bind(context)
        .bind(history)
        .bind(session.total_tokens_used)
        .bind(session.created_at)
        .bind(session.updated_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Database(format!("create session: {e}")))?;
        Ok(())
    }

    pub async fn update_context(
        &self,
        id_or_alias: &str,
        user_id: &str,
        patch: HashMap<String, serde_json::Value>,
    ) -> Result<Session> {
        let mut session = self.require_owned(id_or_alias, user_id).await?;
        session.merge_context(patch);
        self.write_back(&session).await?;
        Ok(session)
    }

    pub async fn append_message(&self, id_or_alias: &str, user_id: &str, msg: Message) -> Result<Session> {
        let mut session = self.require_owned(id_or_alias, user_id).await?;
        session.append_message(msg);
        self.write_back(&session).await?;
        Ok(session)
    }

    pub async fn extend_ttl(&self, id_or_alias: &str, user_id: &str, by: Duration) -> Result<Session> {
        let mut session = self.require_owned(id_or_alias, user_id).await?;
        session.extend_ttl(by);
        self.write_back(&session).await?;
        Ok(session)
    }

    /// Idempotent: returns success whether or not the session was already
    /// deleted. Invalidates both the canonical id and whatever alias was
    /// passed in, best-effort.
    pub async fn soft_delete(&self, id_or_alias: &str, user_id: &str) -> Result<()> {
        let mut session = match self.get(id_or_alias).await? {
            Some(s) => s,
            None => return Ok(()),
        };
        session.check_owner(user_id)?;
        session.soft_delete();

        sqlx::query("UPDATE sessions SET deleted_at = $2, deleted_by = $3 WHERE id = $1")
            .bind(session.id)
            .bind(session.deleted_at)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Database(format!("soft delete session: {e}")))?;

        self.cache.invalidate(&session.id.to_string()).await;
        if let Some(alias) = session.external_id() {
            self.cache.invalidate(alias).await;
        }
        self.cache.invalidate(id_or_alias).await;
        Ok(())
    }

    async fn require_owned(&self, id_or_alias: &str, user_id: &str) -> Result<Session> {
        let session = self
            .get(id_or_alias)
            .await?
            .ok_or_else(|| CoreError::not_found("session"))?;
        session.check_owner(user_id)?;
        Ok(session)
    }

    /// Writes the mutated row back to Postgres then refreshes the cache,
    /// preserving the existing TTL (`KEEPTTL`) rather than resetting it —
    /// an unrelated context merge must not silently extend a session's
    /// lifetime.
    async fn write_back(&self, session: &Session) -> Result<()> {
        let context = serde_json::to_value(&session.context)?;
        let history = serde_json::to_value(&session.history)?;
        sqlx::query(
            r#"
            UPDATE sessions
            SET context = $2, history = $3, updated_at = $4, expires_at = $5, tokens_used = $6
            WHERE id = $1
            "#,
        )
        .bind(session.id)
        .bind(context)
        .bind(history)
        .bind(session.updated_at)
        .bind(session.expires_at)
        .bind(session.total_tokens_used)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Database(format!("update session: {e}")))?;

        self.cache.put_keep_ttl(session).await;
        Ok(())
    }
}

fn default_ttl() -> Duration {
    Duration::hours(24)
}
