//! DTO conversions between the generated `prost` message types and this
//! crate's domain/service types. Kept in one place so a wire-format change
//! touches a single file rather than every handler.

use std::collections::HashMap;

use meridian_core::task::{AgentUsage, TaskExecution};

use crate::pb::orchestration as pb;
use crate::submission::UnifiedStatus;

pub fn labels_to_map(labels: Option<&pb::Labels>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Some(labels) = labels else {
        return map;
    };
    if !labels.priority.is_empty() {
        map.insert("priority".to_string(), labels.priority.clone());
    }
    if !labels.workflow.is_empty() {
        map.insert("workflow".to_string(), labels.workflow.clone());
    }
    if !labels.mode.is_empty() {
        map.insert("mode".to_string(), labels.mode.clone());
    }
    if !labels.template.is_empty() {
        map.insert("template".to_string(), labels.template.clone());
    }
    if !labels.template_version.is_empty() {
        map.insert("template_version".to_string(), labels.template_version.clone());
    }
    if !labels.disable_ai.is_empty() {
        map.insert("disable_ai".to_string(), labels.disable_ai.clone());
    }
    if !labels.cron_schedule.is_empty() {
        map.insert("cron_schedule".to_string(), labels.cron_schedule.clone());
    }
    map
}

pub fn agent_usage_to_pb(usage: &AgentUsage) -> pb::AgentUsage {
    pb::AgentUsage {
        agent_id: usage.agent_id.clone(),
        model: usage.model.clone(),
        provider: usage.provider.clone(),
        total_tokens: usage.total_tokens,
        cost_usd: usage.cost_usd,
    }
}

pub fn unified_status_to_pb(status: &UnifiedStatus) -> pb::GetTaskStatusResponse {
    pb::GetTaskStatusResponse {
        task_id: status.task_id.clone(),
        status: status.status.as_str().to_string(),
        progress: status.progress.clone(),
        result: status.result.clone().unwrap_or_default(),
        metrics: Some(pb::Metrics {
            mode: status.mode.as_str().to_string(),
            total_tokens: status.total_tokens,
            prompt_tokens: status.prompt_tokens,
            completion_tokens: status.completion_tokens,
            cost_usd: status.cost_usd,
            cache_hit: false,
            cache_score: 0.0,
            agent_usages: status.agent_usages.iter().map(agent_usage_to_pb).collect(),
        }),
        error: status.error.clone().unwrap_or_default(),
        stop_reason: status.stop_reason.clone().unwrap_or_default(),
        duration_ms: status.duration_ms.unwrap_or_default(),
    }
}

/// A lighter-weight conversion straight from a ledger row, used for
/// `ListTasks`/`GetSessionContext`'s `recent_tasks`, which display
/// already-persisted state rather than round-tripping through the engine
/// per row.
pub fn task_execution_to_pb(task: &TaskExecution) -> pb::GetTaskStatusResponse {
    pb::GetTaskStatusResponse {
        task_id: task.workflow_id.clone(),
        status: task.status.as_str().to_string(),
        progress: if task.status.is_terminal() { "done".to_string() } else { "running".to_string() },
        result: task.result.clone().unwrap_or_default(),
        metrics: Some(pb::Metrics {
            mode: task.mode.as_str().to_string(),
            total_tokens: task.total_tokens,
            prompt_tokens: task.prompt_tokens,
            completion_tokens: task.completion_tokens,
            cost_usd: task.total_cost_usd,
            cache_hit: false,
            cache_score: 0.0,
            agent_usages: Vec::new(),
        }),
        error: task.error_message.clone().unwrap_or_default(),
        stop_reason: String::new(),
        duration_ms: task.duration_ms.unwrap_or_default(),
    }
}
