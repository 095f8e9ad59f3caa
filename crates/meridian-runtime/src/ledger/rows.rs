//! Raw `sqlx::FromRow` shapes and their conversion into the pure
//! `meridian_core` domain types. Kept separate from `mod.rs` so the SQL
//! layer's column-naming concerns don't leak into the query methods.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use meridian_core::error::{CoreError, Result};
use meridian_core::event::{EventRecord, StreamId};
use meridian_core::task::{ModeLabel, TaskExecution, TaskStatus};
use uuid::Uuid;

#[derive(sqlx::FromRow)]
pub struct TaskExecutionRow {
    pub id: Uuid,
    pub workflow_id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub session_id: String,
    pub query: String,
    pub mode: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub total_tokens: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_cost_usd: f64,
    pub model_used: Option<String>,
    pub provider: Option<String>,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
}

impl TaskExecutionRow {
    pub fn into_domain(self) -> Result<TaskExecution> {
        let mode = parse_mode(&self.mode)?;
        let status = TaskStatus::parse(&self.status)
            .ok_or_else(|| CoreError::Internal(format!("unrecognized task status in row: {}", self.status)))?;
        let metadata: HashMap<String, serde_json::Value> =
            serde_json::from_value(self.metadata).unwrap_or_default();
        Ok(TaskExecution {
            id: self.id,
            workflow_id: self.workflow_id,
            user_id: self.user_id,
            tenant_id: self.tenant_id,
            session_id: self.session_id,
            query: self.query,
            mode,
            status,
            started_at: self.started_at,
            completed_at: self.completed_at,
            duration_ms: self.duration_ms,
            total_tokens: self.total_tokens,
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_cost_usd: self.total_cost_usd,
            model_used: self.model_used,
            provider: self.provider,
            metadata,
            result: self.result,
            error_message: self.error_message,
        })
    }
}

fn parse_mode(s: &str) -> Result<ModeLabel> {
    match s {
        "simple" => Ok(ModeLabel::Simple),
        "standard" => Ok(ModeLabel::Standard),
        "complex" => Ok(ModeLabel::Complex),
        "supervisor" => Ok(ModeLabel::Supervisor),
        other => Err(CoreError::Internal(format!("unrecognized task mode in row: {other}"))),
    }
}

#[derive(sqlx::FromRow)]
pub struct EventLogRow {
    pub workflow_id: String,
    #[sqlx(rename = "type")]
    pub event_type: String,
    pub agent_id: Option<String>,
    pub message: Option<String>,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub seq: i64,
    pub stream_id: String,
}

impl EventLogRow {
    pub fn into_domain(self) -> EventRecord {
        EventRecord {
            workflow_id: self.workflow_id,
            event_type: self.event_type,
            agent_id: self.agent_id,
            message: self.message,
            payload: self.payload,
            timestamp: self.timestamp,
            seq: self.seq,
            stream_id: StreamId(self.stream_id),
        }
    }
}
