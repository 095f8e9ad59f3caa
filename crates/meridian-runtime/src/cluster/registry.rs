use meridian_core::cluster::{NodeId, NodeInfo, NodeRole, NodeStatus};
use meridian_core::error::{CoreError, Result};
use sqlx::PgPool;

/// Postgres-backed registry of core instances, used for visibility and as
/// the source [`heartbeat`](super::heartbeat) sweeps for staleness.
#[derive(Clone)]
pub struct NodeRegistry {
    pool: PgPool,
}

impl NodeRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn register(&self, node: &NodeInfo) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO meridian_nodes (id, hostname, role, status, last_heartbeat)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                hostname = EXCLUDED.hostname,
                role = EXCLUDED.role,
                status = EXCLUDED.status,
                last_heartbeat = EXCLUDED.last_heartbeat
            "#,
        )
        .bind(node.id.0)
        .bind(&node.hostname)
        .bind(node.role.as_str())
        .bind(node.status.as_str())
        .bind(node.last_heartbeat)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Database(format!("register node: {e}")))?;
        Ok(())
    }

    pub async fn touch_heartbeat(&self, node_id: NodeId) -> Result<()> {
        sqlx::query("UPDATE meridian_nodes SET last_heartbeat = now() WHERE id = $1")
            .bind(node_id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Database(format!("touch heartbeat: {e}")))?;
        Ok(())
    }

    pub async fn mark_draining(&self, node_id: NodeId) -> Result<()> {
        self.set_status(node_id, NodeStatus::Draining).await
    }

    async fn set_status(&self, node_id: NodeId, status: NodeStatus) -> Result<()> {
        sqlx::query("UPDATE meridian_nodes SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(node_id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Database(format!("set node status: {e}")))?;
        Ok(())
    }

    /// Marks nodes whose heartbeat is older than `stale_after` as `Dead`.
    /// Any instance may run this; it is idempotent and side-effect-free for
    /// already-dead nodes.
    pub async fn sweep_dead(&self, stale_after: chrono::Duration) -> Result<u64> {
        let cutoff = chrono::Utc::now() - stale_after;
        let result = sqlx::query(
            "UPDATE meridian_nodes SET status = 'dead' WHERE last_heartbeat < $1 AND status != 'dead'",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Database(format!("sweep dead nodes: {e}")))?;
        Ok(result.rows_affected())
    }

    pub async fn active_nodes(&self) -> Result<Vec<(NodeId, NodeRole)>> {
        let rows: Vec<(uuid::Uuid, String)> =
            sqlx::query_as("SELECT id, role FROM meridian_nodes WHERE status = 'active'")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| CoreError::Database(format!("list active nodes: {e}")))?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, role)| NodeRole::from_str(&role).map(|r| (NodeId(id), r)))
            .collect())
    }
}
