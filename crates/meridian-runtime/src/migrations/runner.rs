//! Migration runner guarded by a Postgres advisory lock, so two core
//! instances starting concurrently against an empty database apply the
//! schema exactly once (ambient test scenario 7).

use std::collections::HashSet;

use meridian_core::error::{CoreError, Result};
use sqlx::PgPool;
use tracing::{debug, info};

/// The advisory lock ID migrations take, distinct from
/// [`meridian_core::cluster::LeaderRole::lock_id`]'s namespace.
const MIGRATION_LOCK_ID: i64 = 0x4D455249_4449_0002;

#[derive(Debug, Clone)]
pub struct Migration {
    pub name: String,
    pub up_sql: String,
}

impl Migration {
    pub fn new(name: impl Into<String>, up_sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            up_sql: up_sql.into(),
        }
    }
}

pub struct MigrationRunner {
    pool: PgPool,
}

impl MigrationRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies every not-yet-applied builtin migration, holding the
    /// advisory lock for the whole run so a concurrent second instance
    /// blocks until the first is done rather than racing it.
    pub async fn run(&self) -> Result<()> {
        self.acquire_lock().await?;
        let result = self.run_inner().await;
        if let Err(e) = self.release_lock().await {
            tracing::warn!(error = %e, "failed to release migration advisory lock");
        }
        result
    }

    async fn run_inner(&self) -> Result<()> {
        self.ensure_tracking_table().await?;
        let applied = self.applied_migrations().await?;
        for migration in super::builtin::get_builtin_migrations() {
            if applied.contains(&migration.name) {
                continue;
            }
            self.apply(&migration).await?;
        }
        Ok(())
    }

    async fn acquire_lock(&self) -> Result<()> {
        debug!("acquiring migration advisory lock");
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Database(format!("acquire migration lock: {e}")))?;
        Ok(())
    }

    async fn release_lock(&self) -> Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Database(format!("release migration lock: {e}")))?;
        Ok(())
    }

    async fn ensure_tracking_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meridian_migrations (
                id SERIAL PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Database(format!("create migration tracking table: {e}")))?;
        Ok(())
    }

    async fn applied_migrations(&self) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM meridian_migrations")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::Database(format!("read applied migrations: {e}")))?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn apply(&self, migration: &Migration) -> Result<()> {
        info!(migration = %migration.name, "applying migration");
        sqlx::query(&migration.up_sql)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Database(format!("apply migration '{}': {e}", migration.name)))?;
        sqlx::query("INSERT INTO meridian_migrations (name) VALUES ($1)")
            .bind(&migration.name)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Database(format!("record migration '{}': {e}", migration.name)))?;
        Ok(())
    }
}
