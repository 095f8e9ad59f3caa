//! Schema for the persistence layout named in SPEC_FULL.md §6: `sessions`,
//! `task_executions`, `token_usage`, `event_logs`, plus the ambient
//! `meridian_nodes` cluster-registry table and the migration tracking
//! table itself. One [`super::Migration`] per logical DDL change so the
//! tracking table's row count is a meaningful progress marker.

use super::Migration;

pub fn get_builtin_migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            "0001_sessions",
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id UUID PRIMARY KEY,
                user_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                context JSONB NOT NULL DEFAULT '{}'::jsonb,
                token_budget BIGINT NOT NULL DEFAULT 0,
                tokens_used BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                expires_at TIMESTAMPTZ NOT NULL,
                deleted_at TIMESTAMPTZ,
                deleted_by TEXT
            )
            "#,
        ),
        Migration::new(
            "0002_sessions_external_id_index",
            r#"
            CREATE INDEX IF NOT EXISTS idx_sessions_external_id
                ON sessions ((context->>'external_id'))
            "#,
        ),
        Migration::new(
            "0003_task_executions",
            r#"
            CREATE TABLE IF NOT EXISTS task_executions (
                id UUID PRIMARY KEY,
                workflow_id TEXT UNIQUE NOT NULL,
                user_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                query TEXT NOT NULL,
                mode TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ,
                duration_ms BIGINT,
                total_tokens BIGINT NOT NULL DEFAULT 0,
                prompt_tokens BIGINT NOT NULL DEFAULT 0,
                completion_tokens BIGINT NOT NULL DEFAULT 0,
                total_cost_usd DOUBLE PRECISION NOT NULL DEFAULT 0,
                model_used TEXT,
                provider TEXT,
                result TEXT,
                error_message TEXT,
                metadata JSONB NOT NULL DEFAULT '{}'::jsonb
            )
            "#,
        ),
        Migration::new(
            "0004_task_executions_user_index",
            r#"
            CREATE INDEX IF NOT EXISTS idx_task_executions_user_started
                ON task_executions (user_id, started_at DESC)
            "#,
        ),
        Migration::new(
            "0005_token_usage",
            r#"
            CREATE TABLE IF NOT EXISTS token_usage (
                id BIGSERIAL PRIMARY KEY,
                task_id UUID NOT NULL REFERENCES task_executions (id),
                agent_id TEXT NOT NULL,
                model TEXT NOT NULL,
                provider TEXT NOT NULL,
                prompt_tokens BIGINT NOT NULL DEFAULT 0,
                completion_tokens BIGINT NOT NULL DEFAULT 0,
                total_tokens BIGINT NOT NULL DEFAULT 0,
                cost_usd DOUBLE PRECISION NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        ),
        Migration::new(
            "0006_token_usage_task_index",
            r#"
            CREATE INDEX IF NOT EXISTS idx_token_usage_task_id ON token_usage (task_id)
            "#,
        ),
        Migration::new(
            "0007_event_logs",
            r#"
            CREATE TABLE IF NOT EXISTS event_logs (
                id BIGSERIAL PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                type TEXT NOT NULL,
                agent_id TEXT,
                message TEXT,
                payload JSONB NOT NULL DEFAULT '{}'::jsonb,
                timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
                seq BIGINT NOT NULL,
                stream_id TEXT NOT NULL
            )
            "#,
        ),
        Migration::new(
            "0008_event_logs_workflow_seq_index",
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_event_logs_workflow_seq
                ON event_logs (workflow_id, seq)
            "#,
        ),
        Migration::new(
            "0009_meridian_nodes",
            r#"
            CREATE TABLE IF NOT EXISTS meridian_nodes (
                id UUID PRIMARY KEY,
                hostname TEXT NOT NULL,
                role TEXT NOT NULL,
                status TEXT NOT NULL,
                last_heartbeat TIMESTAMPTZ NOT NULL
            )
            "#,
        ),
        Migration::new(
            "0010_sessions_history_column",
            r#"
            ALTER TABLE sessions ADD COLUMN IF NOT EXISTS history JSONB NOT NULL DEFAULT '[]'::jsonb
            "#,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_migrations_have_unique_names() {
        let migrations = get_builtin_migrations();
        let mut names: Vec<_> = migrations.iter().map(|m| m.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), migrations.len());
    }
}
