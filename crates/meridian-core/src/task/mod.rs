use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Terminal/non-terminal task status. Marshalled to canonical uppercase
/// strings at the persistence boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Timeout
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Timeout => "TIMEOUT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RUNNING" => Some(Self::Running),
            "PAUSED" => Some(Self::Paused),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            "TIMEOUT" => Some(Self::Timeout),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Workflow-variant label attached at submission time; mirrors the router's
/// sum-type selection so no stringly-typed mode leaks past C5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeLabel {
    Simple,
    Standard,
    Complex,
    Supervisor,
}

impl ModeLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Standard => "standard",
            Self::Complex => "complex",
            Self::Supervisor => "supervisor",
        }
    }
}

/// A row in the Task Ledger: the authoritative, relationally persisted
/// record of a single workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub id: Uuid,
    pub workflow_id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub session_id: String,
    pub query: String,
    pub mode: ModeLabel,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub total_tokens: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_cost_usd: f64,
    pub model_used: Option<String>,
    pub provider: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub result: Option<String>,
    pub error_message: Option<String>,
}

impl TaskExecution {
    pub fn new_running(
        workflow_id: impl Into<String>,
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        session_id: impl Into<String>,
        query: impl Into<String>,
        mode: ModeLabel,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow_id.into(),
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            session_id: session_id.into(),
            query: query.into(),
            mode,
            status: TaskStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            total_tokens: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            total_cost_usd: 0.0,
            model_used: None,
            provider: None,
            metadata: HashMap::new(),
            result: None,
            error_message: None,
        }
    }

    /// Enforces terminal-state monotonicity (P1, invariant ii): once
    /// terminal, only metadata enrichment is allowed, never a status change.
    pub fn transition_to(&mut self, new_status: TaskStatus, at: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(CoreError::FailedPrecondition(format!(
                "task {} already terminal ({})",
                self.workflow_id, self.status
            )));
        }
        self.status = new_status;
        if new_status.is_terminal() {
            let completed_at = at.max(self.started_at);
            self.completed_at = Some(completed_at);
            if self.duration_ms.is_none() {
                self.duration_ms =
                    Some((completed_at - self.started_at).num_milliseconds().max(0));
            }
        }
        Ok(())
    }
}

/// Per-call token usage line, joined to a [`TaskExecution`] by task UUID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsageLine {
    pub task_id: Uuid,
    pub agent_id: String,
    pub model: String,
    pub provider: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub cost_usd: f64,
    pub created_at: DateTime<Utc>,
}

/// Aggregate totals across the token usage ledger for one workflow.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenAggregate {
    pub total: i64,
    pub prompt: i64,
    pub completion: i64,
    pub cost: f64,
}

/// Per-`(agent_id, model, provider)` aggregate, for the per-agent usage
/// breakdown in the unified response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentUsage {
    pub agent_id: String,
    pub model: String,
    pub provider: String,
    pub total_tokens: i64,
    pub cost_usd: f64,
}

/// Imputes a 60/40 prompt/completion split when both are zero but a total
/// exists. See SPEC_FULL.md Open Question (b): preserved for fidelity, kept
/// as a single pure, isolated, unit-tested function so a future revision of
/// the split ratio is a one-function change.
pub fn impute_split(total: i64) -> (i64, i64) {
    if total <= 0 {
        return (0, 0);
    }
    let prompt = (total as f64 * 0.6).round() as i64;
    let completion = total - prompt;
    (prompt, completion)
}

/// Rich finalization merge rule (§4.2): ledger aggregates overwrite
/// workflow-supplied totals when nonzero; otherwise workflow metadata is
/// preserved. Applied by C6/C7 on terminal read.
pub fn merge_token_totals(task: &mut TaskExecution, aggregate: TokenAggregate) {
    if aggregate.total > 0 {
        task.total_tokens = aggregate.total;
        task.prompt_tokens = aggregate.prompt;
        task.completion_tokens = aggregate.completion;
        task.total_cost_usd = aggregate.cost;
        return;
    }
    if task.prompt_tokens == 0 && task.completion_tokens == 0 && task.total_tokens > 0 {
        let (prompt, completion) = impute_split(task.total_tokens);
        task.prompt_tokens = prompt;
        task.completion_tokens = completion;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample() -> TaskExecution {
        TaskExecution::new_running("task-u1-1", "u1", "t1", "s1", "2+2", ModeLabel::Simple)
    }

    #[test]
    fn terminal_transition_sets_completed_at_and_duration() {
        let mut t = sample();
        let at = t.started_at + Duration::seconds(5);
        t.transition_to(TaskStatus::Completed, at).unwrap();
        assert_eq!(t.status, TaskStatus::Completed);
        assert_eq!(t.completed_at, Some(at));
        assert_eq!(t.duration_ms, Some(5000));
    }

    #[test]
    fn monotonicity_rejects_transition_out_of_terminal() {
        let mut t = sample();
        t.transition_to(TaskStatus::Completed, Utc::now()).unwrap();
        let err = t.transition_to(TaskStatus::Running, Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::FailedPrecondition(_)));
        assert_eq!(t.status, TaskStatus::Completed);
    }

    #[test]
    fn merge_rule_prefers_nonzero_aggregate() {
        let mut t = sample();
        t.total_tokens = 100;
        t.prompt_tokens = 60;
        t.completion_tokens = 40;
        merge_token_totals(
            &mut t,
            TokenAggregate {
                total: 12_345,
                prompt: 7_000,
                completion: 5_345,
                cost: 0.42,
            },
        );
        assert_eq!(t.total_tokens, 12_345);
        assert_eq!(t.prompt_tokens, 7_000);
        assert_eq!(t.completion_tokens, 5_345);
    }

    #[test]
    fn merge_rule_preserves_workflow_metadata_when_aggregate_zero() {
        let mut t = sample();
        t.total_tokens = 100;
        t.prompt_tokens = 60;
        t.completion_tokens = 40;
        merge_token_totals(&mut t, TokenAggregate::default());
        assert_eq!(t.total_tokens, 100);
        assert_eq!(t.prompt_tokens, 60);
        assert_eq!(t.completion_tokens, 40);
    }

    #[test]
    fn imputed_split_only_when_breakdown_missing() {
        let mut t = sample();
        t.total_tokens = 100;
        merge_token_totals(&mut t, TokenAggregate::default());
        assert_eq!(t.prompt_tokens, 60);
        assert_eq!(t.completion_tokens, 40);
    }

    #[test]
    fn impute_split_is_60_40() {
        assert_eq!(impute_split(100), (60, 40));
        assert_eq!(impute_split(0), (0, 0));
    }
}
