use std::time::Duration;

use meridian_core::config::DatabaseConfig;
use meridian_core::error::{CoreError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Connects a pool sized and timed out per [`DatabaseConfig`]. Statement
/// timeout is set on every acquired connection via `after_connect`, since
/// Postgres has no pool-level equivalent.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let statement_timeout_ms = config.statement_timeout_secs * 1000;
    PgPoolOptions::new()
        .max_connections(config.pool_size)
        .acquire_timeout(Duration::from_secs(config.pool_timeout_secs))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query(&format!("SET statement_timeout = {statement_timeout_ms}"))
                    .execute(conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await
        .map_err(|e| CoreError::Database(format!("failed to connect: {e}")))
}

pub async fn health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| CoreError::Database(format!("health check failed: {e}")))?;
    Ok(())
}
