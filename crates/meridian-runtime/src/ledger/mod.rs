//! C2: the Task Ledger. The authoritative relational record of task
//! executions, their per-call token usage lines, and the durable fallback
//! event log — all in Postgres via `sqlx`.

mod queue;
mod rows;

pub use queue::LedgerWriteQueue;

use meridian_core::error::{CoreError, Result};
use meridian_core::event::EventRecord;
use meridian_core::task::{AgentUsage, TaskExecution, TaskStatus, TokenAggregate, TokenUsageLine};
use sqlx::PgPool;
use uuid::Uuid;

/// Filter for [`Ledger::list_tasks`]. `session_id`/`status` narrow the
/// result; `None` leaves that dimension unconstrained.
#[derive(Debug, Clone)]
pub struct TaskListFilter {
    pub user_id: String,
    pub tenant_id: String,
    pub session_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Clone)]
pub struct Ledger {
    pool: PgPool,
}

impl Ledger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent: a second call for the same `workflow_id` is a no-op
    /// rather than a conflict (submission retries must be safe).
    pub async fn create_initial(&self, task: &TaskExecution) -> Result<()> {
        let metadata = serde_json::to_value(&task.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO task_executions
                (id, workflow_id, user_id, tenant_id, session_id, query, mode, status,
                 started_at, total_tokens, prompt_tokens, completion_tokens, total_cost_usd,
                 metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, 0, 0, 0, $10)
            ON CONFLICT (workflow_id) DO NOTHING
            "#,
        )
        .bind(task.id)
        .bind(&task.workflow_id)
        .bind(&task.user_id)
        .bind(&task.tenant_id)
        .bind(&task.session_id)
        .bind(&task.query)
        .bind(task.mode.as_str())
        .bind(task.status.as_str())
        .bind(task.started_at)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Database(format!("create_initial task execution: {e}")))?;
        Ok(())
    }

    pub async fn get_by_workflow_id(&self, workflow_id: &str) -> Result<Option<TaskExecution>> {
        let row = sqlx::query_as::<_, rows::TaskExecutionRow>(
            "SELECT * FROM task_executions WHERE workflow_id = $1",
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::Database(format!("fetch task execution: {e}")))?;
        row.map(rows::TaskExecutionRow::into_domain).transpose()
    }

    /// Monotonic status write: the `WHERE status NOT IN (...)` guard means a
    /// terminal row is never overwritten by a late-arriving non-terminal
    /// update racing behind it (P1).
    pub async fn update_status(
        &self,
        workflow_id: &str,
        new_status: TaskStatus,
        completed_at: Option<chrono::DateTime<chrono::Utc>>,
        duration_ms: Option<i64>,
        result: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let outcome = sqlx::query(
            r#"
            UPDATE task_executions
            SET status = $2,
                completed_at = COALESCE($3, completed_at),
                duration_ms = COALESCE($4, duration_ms),
                result = COALESCE($5, result),
                error_message = COALESCE($6, error_message)
            WHERE workflow_id = $1
              AND status NOT IN ('COMPLETED', 'FAILED', 'CANCELLED', 'TIMEOUT')
            "#,
        )
        .bind(workflow_id)
        .bind(new_status.as_str())
        .bind(completed_at)
        .bind(duration_ms)
        .bind(result)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Database(format!("update task execution status: {e}")))?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Full-row overwrite used by [`LedgerWriteQueue`] for the asynchronous
    /// `queue_write` contract (§4.2) — writes every mutable field of `task`
    /// in one statement rather than threading through per-field updates.
    pub async fn upsert_full(&self, task: &TaskExecution) -> Result<()> {
        let metadata = serde_json::to_value(&task.metadata)?;
        sqlx::query(
            r#"
            UPDATE task_executions
            SET status = $2,
                completed_at = $3,
                duration_ms = $4,
                total_tokens = $5,
                prompt_tokens = $6,
                completion_tokens = $7,
                total_cost_usd = $8,
                model_used = $9,
                provider = $10,
                result = $11,
                error_message = $12,
                metadata = $13
            WHERE workflow_id = $1
            "#,
        )
        .bind(&task.workflow_id)
        .bind(task.status.as_str())
        .bind(task.completed_at)
        .bind(task.duration_ms)
        .bind(task.total_tokens)
        .bind(task.prompt_tokens)
        .bind(task.completion_tokens)
        .bind(task.total_cost_usd)
        .bind(&task.model_used)
        .bind(&task.provider)
        .bind(&task.result)
        .bind(&task.error_message)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Database(format!("upsert_full task execution: {e}")))?;
        Ok(())
    }

    pub async fn record_token_usage(&self, line: &TokenUsageLine) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO token_usage
                (task_id, agent_id, model, provider, prompt_tokens, completion_tokens,
                 total_tokens, cost_usd, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(line.task_id)
        .bind(&line.agent_id)
        .bind(&line.model)
        .bind(&line.provider)
        .bind(line.prompt_tokens)
        .bind(line.completion_tokens)
        .bind(line.total_tokens)
        .bind(line.cost_usd)
        .bind(line.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Database(format!("record token usage line: {e}")))?;
        Ok(())
    }

    pub async fn aggregate_tokens(&self, task_id: Uuid) -> Result<TokenAggregate> {
        let row: (Option<i64>, Option<i64>, Option<i64>, Option<f64>) = sqlx::query_as(
            r#"
            SELECT SUM(total_tokens), SUM(prompt_tokens), SUM(completion_tokens), SUM(cost_usd)
            FROM token_usage WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::Database(format!("aggregate token usage: {e}")))?;
        Ok(TokenAggregate {
            total: row.0.unwrap_or(0),
            prompt: row.1.unwrap_or(0),
            completion: row.2.unwrap_or(0),
            cost: row.3.unwrap_or(0.0),
        })
    }

    pub async fn aggregate_agent_usages(&self, task_id: Uuid) -> Result<Vec<AgentUsage>> {
        let rows: Vec<(String, String, String, i64, f64)> = sqlx::query_as(
            r#"
            SELECT agent_id, model, provider, SUM(total_tokens), SUM(cost_usd)
            FROM token_usage
            WHERE task_id = $1
            GROUP BY agent_id, model, provider
            ORDER BY agent_id
            "#,
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Database(format!("aggregate per-agent usage: {e}")))?;
        Ok(rows
            .into_iter()
            .map(|(agent_id, model, provider, total_tokens, cost_usd)| AgentUsage {
                agent_id,
                model,
                provider,
                total_tokens,
                cost_usd,
            })
            .collect())
    }

    /// Persists an event to the durable fallback log. Callers should only
    /// invoke this for events where [`EventRecord::is_durable`] is true —
    /// enforced here too, defensively, since a wrongly-called durable write
    /// of an `LLM_PARTIAL` delta is cheap to guard against and expensive to
    /// clean up later.
    pub async fn record_event_log(&self, event: &EventRecord) -> Result<()> {
        if !event.is_durable() {
            return Ok(());
        }
        sqlx::query(
            r#"
            INSERT INTO event_logs (workflow_id, type, agent_id, message, payload, timestamp, seq, stream_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (workflow_id, seq) DO NOTHING
            "#,
        )
        .bind(&event.workflow_id)
        .bind(&event.event_type)
        .bind(&event.agent_id)
        .bind(&event.message)
        .bind(&event.payload)
        .bind(event.timestamp)
        .bind(event.seq)
        .bind(&event.stream_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Database(format!("record event log: {e}")))?;
        Ok(())
    }

    /// C6's `ListTasks`/`GetSessionContext` backing query: filters by owner
    /// and, optionally, session and status, newest first.
    pub async fn list_tasks(&self, filter: &TaskListFilter) -> Result<(Vec<TaskExecution>, i64)> {
        let status = filter.status.map(|s| s.as_str());
        let rows = sqlx::query_as::<_, rows::TaskExecutionRow>(
            r#"
            SELECT * FROM task_executions
            WHERE user_id = $1
              AND tenant_id = $2
              AND ($3::text IS NULL OR session_id = $3)
              AND ($4::text IS NULL OR status = $4)
            ORDER BY started_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(&filter.user_id)
        .bind(&filter.tenant_id)
        .bind(&filter.session_id)
        .bind(status)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Database(format!("list task executions: {e}")))?;

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM task_executions
            WHERE user_id = $1
              AND tenant_id = $2
              AND ($3::text IS NULL OR session_id = $3)
              AND ($4::text IS NULL OR status = $4)
            "#,
        )
        .bind(&filter.user_id)
        .bind(&filter.tenant_id)
        .bind(&filter.session_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::Database(format!("count task executions: {e}")))?;

        let tasks = rows
            .into_iter()
            .map(rows::TaskExecutionRow::into_domain)
            .collect::<Result<Vec<_>>>()?;
        Ok((tasks, total.0))
    }

    /// Workflow identifiers still in a non-terminal state. A restarted
    /// process feeds this into [`crate::finalizer::Finalizer::relaunch_open_tasks`]
    /// so an instance that died mid-watch doesn't leave its tasks stuck.
    pub async fn list_open_workflow_ids(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT workflow_id FROM task_executions
            WHERE status NOT IN ('COMPLETED', 'FAILED', 'CANCELLED', 'TIMEOUT')
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Database(format!("list open workflow ids: {e}")))?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn event_log_since(&self, workflow_id: &str, last_seq: i64) -> Result<Vec<EventRecord>> {
        let rows = sqlx::query_as::<_, rows::EventLogRow>(
            r#"
            SELECT workflow_id, type, agent_id, message, payload, timestamp, seq, stream_id
            FROM event_logs
            WHERE workflow_id = $1 AND seq > $2
            ORDER BY seq ASC
            "#,
        )
        .bind(workflow_id)
        .bind(last_seq)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Database(format!("read event log: {e}")))?;
        Ok(rows.into_iter().map(rows::EventLogRow::into_domain).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::task::ModeLabel;
    use meridian_core::event::StreamId;

    async fn migrated(pool: PgPool) -> Ledger {
        crate::migrations::MigrationRunner::new(pool.clone())
            .run()
            .await
            .unwrap();
        Ledger::new(pool)
    }

    #[sqlx::test]
    async fn create_initial_is_idempotent(pool: PgPool) {
        let ledger = migrated(pool).await;
        let task = TaskExecution::new_running("wf-1", "u1", "t1", "s1", "2+2", ModeLabel::Simple);
        ledger.create_initial(&task).await.unwrap();
        ledger.create_initial(&task).await.unwrap();

        let stored = ledger.get_by_workflow_id("wf-1").await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Running);
        assert_eq!(stored.id, task.id);
    }

    #[sqlx::test]
    async fn terminal_status_is_monotonic(pool: PgPool) {
        let ledger = migrated(pool).await;
        let task = TaskExecution::new_running("wf-2", "u1", "t1", "s1", "q", ModeLabel::Standard);
        ledger.create_initial(&task).await.unwrap();

        let now = chrono::Utc::now();
        let applied = ledger
            .update_status("wf-2", TaskStatus::Completed, Some(now), Some(500), Some("ok"), None)
            .await
            .unwrap();
        assert!(applied);

        // A later attempt to move the already-terminal row back to RUNNING
        // must be rejected by the `status NOT IN (...)` guard (P1).
        let applied_again = ledger
            .update_status("wf-2", TaskStatus::Running, None, None, None, None)
            .await
            .unwrap();
        assert!(!applied_again);

        let stored = ledger.get_by_workflow_id("wf-2").await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
    }

    #[sqlx::test]
    async fn aggregate_tokens_sums_usage_lines(pool: PgPool) {
        let ledger = migrated(pool).await;
        let task = TaskExecution::new_running("wf-3", "u1", "t1", "s1", "q", ModeLabel::Complex);
        ledger.create_initial(&task).await.unwrap();

        for (agent, model, total, cost) in [
            ("researcher", "claude-3", 800i64, 0.12f64),
            ("writer", "claude-3", 500i64, 0.08f64),
        ] {
            ledger
                .record_token_usage(&TokenUsageLine {
                    task_id: task.id,
                    agent_id: agent.to_string(),
                    model: model.to_string(),
                    provider: "anthropic".to_string(),
                    prompt_tokens: total / 2,
                    completion_tokens: total / 2,
                    total_tokens: total,
                    cost_usd: cost,
                    created_at: chrono::Utc::now(),
                })
                .await
                .unwrap();
        }

        let aggregate = ledger.aggregate_tokens(task.id).await.unwrap();
        assert_eq!(aggregate.total, 1300);
        assert!((aggregate.cost - 0.20).abs() < 1e-9);

        let usages = ledger.aggregate_agent_usages(task.id).await.unwrap();
        assert_eq!(usages.len(), 2);
    }

    #[sqlx::test]
    async fn record_event_log_skips_partial_events(pool: PgPool) {
        let ledger = migrated(pool).await;
        let task = TaskExecution::new_running("wf-4", "u1", "t1", "s1", "q", ModeLabel::Simple);
        ledger.create_initial(&task).await.unwrap();

        let partial = EventRecord {
            workflow_id: "wf-4".to_string(),
            event_type: meridian_core::event::event_type::LLM_PARTIAL.to_string(),
            agent_id: None,
            message: None,
            payload: serde_json::json!({}),
            timestamp: chrono::Utc::now(),
            seq: 1,
            stream_id: StreamId("1-0".to_string()),
        };
        ledger.record_event_log(&partial).await.unwrap();

        let durable = EventRecord {
            event_type: meridian_core::event::event_type::WORKFLOW_COMPLETED.to_string(),
            seq: 2,
            stream_id: StreamId("2-0".to_string()),
            ..partial.clone()
        };
        ledger.record_event_log(&durable).await.unwrap();

        let stored = ledger.event_log_since("wf-4", 0).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event_type, meridian_core::event::event_type::WORKFLOW_COMPLETED);
    }

    #[sqlx::test]
    async fn list_open_workflow_ids_excludes_terminal(pool: PgPool) {
        let ledger = migrated(pool).await;
        let running = TaskExecution::new_running("wf-running", "u1", "t1", "s1", "q", ModeLabel::Simple);
        let done = TaskExecution::new_running("wf-done", "u1", "t1", "s1", "q", ModeLabel::Simple);
        ledger.create_initial(&running).await.unwrap();
        ledger.create_initial(&done).await.unwrap();
        ledger
            .update_status("wf-done", TaskStatus::Completed, Some(chrono::Utc::now()), Some(1), None, None)
            .await
            .unwrap();

        let open = ledger.list_open_workflow_ids().await.unwrap();
        assert!(open.contains(&"wf-running".to_string()));
        assert!(!open.contains(&"wf-done".to_string()));
    }
}
