//! C6: Task Submission & Status Service. Orchestrates C3 → C5 → C4 → C2 on
//! submit (§4.6), and composes the unified status response by merging the
//! engine's `describe` with C2's ledger aggregates.

mod stop_reason;

pub use stop_reason::stop_reason;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use meridian_core::engine::{EngineClient, EngineStatus, Memo, StartOptions, WorkflowResult};
use meridian_core::error::{CoreError, Result};
use meridian_core::event::{event_type, EventRecord, StreamId};
use meridian_core::router::{RouteRequest, RouterPolicy};
use meridian_core::session::{Message, MessageRole};
use meridian_core::task::{AgentUsage, ModeLabel, TaskExecution, TaskStatus};
use meridian_core::tenant::{enforce_owner, enforce_tenant, CallerContext};
use uuid::Uuid;

use crate::event_bus::EventBus;
use crate::finalizer::Finalizer;
use crate::ledger::Ledger;
use crate::session_store::SessionStore;

/// Everything the caller supplies when submitting a task, already parsed
/// off the gRPC request.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub query: String,
    pub session_id_or_alias: Option<String>,
    pub labels: HashMap<String, String>,
    pub context: serde_json::Value,
    pub manual_decomposition_mode: Option<String>,
    pub require_approval: bool,
}

#[derive(Debug, Clone)]
pub struct SubmitResponse {
    pub workflow_id: String,
    pub task_id: Uuid,
    pub session_id: Uuid,
    pub mode: ModeLabel,
    pub complexity_score: f64,
}

#[derive(Debug, Clone)]
pub struct UnifiedStatus {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: String,
    pub result: Option<String>,
    pub mode: ModeLabel,
    pub total_tokens: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub cost_usd: f64,
    pub agent_usages: Vec<AgentUsage>,
    pub error: Option<String>,
    pub stop_reason: Option<String>,
    pub duration_ms: Option<i64>,
}

pub struct SubmissionService {
    sessions: SessionStore,
    ledger: Ledger,
    bus: Arc<EventBus>,
    engine: Arc<dyn EngineClient>,
    router: RouterPolicy,
    finalizer: Arc<Finalizer>,
}

impl SubmissionService {
    pub fn new(
        sessions: SessionStore,
        ledger: Ledger,
        bus: Arc<EventBus>,
        engine: Arc<dyn EngineClient>,
        router: RouterPolicy,
        finalizer: Arc<Finalizer>,
    ) -> Self {
        Self {
            sessions,
            ledger,
            bus,
            engine,
            router,
            finalizer,
        }
    }

    pub async fn submit(&self, caller: &CallerContext, req: SubmitRequest) -> Result<SubmitResponse> {
        caller.require_authenticated()?;

        // Step 2: resolve or create the session. A cross-user hit on an
        // existing id/alias silently forces a new session rather than
        // leaking that the resource exists under someone else's ownership.
        let session = match &req.session_id_or_alias {
            Some(id_or_alias) => match self.sessions.get(id_or_alias).await? {
                Some(s) if s.user_id == caller.user_id => s,
                Some(_) | None => {
                    self.sessions
                        .create(caller.user_id.clone(), caller.tenant_id.clone(), HashMap::new())
                        .await?
                }
            },
            None => {
                self.sessions
                    .create(caller.user_id.clone(), caller.tenant_id.clone(), HashMap::new())
                    .await?
            }
        };

        // Step 3: normalize disable_ai/template from context or labels and
        // apply the router's guardrails up front so a bad request fails
        // before any workflow input is built.
        let disable_ai = req
            .context
            .get("disable_ai")
            .map(meridian_core::router::parse_disable_ai)
            .unwrap_or(false);
        let template = req
            .context
            .get("template")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let template_version = req
            .context
            .get("template_version")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let route_req = RouteRequest {
            labels: req.labels.clone(),
            manual_decomposition: meridian_core::router::ManualDecomposition {
                mode: req.manual_decomposition_mode.clone(),
            },
            disable_ai,
            model_override: req.context.get("model_override").and_then(|v| v.as_str()).map(str::to_string),
            provider_override: req
                .context
                .get("provider_override")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            model_tier: req.context.get("model_tier").and_then(|v| v.as_str()).map(str::to_string),
        };
        let decision = self.router.route(&route_req)?;

        // Step 4: persist the query as a session message.
        let session = self
            .sessions
            .append_message(
                &session.id.to_string(),
                &caller.user_id,
                Message::new(MessageRole::User, req.query.clone()),
            )
            .await?;

        // Step 5: build workflow input from recent history and control flags.
        let recent = session.recent_history(meridian_core::session::HISTORY_WINDOW_DEFAULT);
        let input = serde_json::json!({
            "query": req.query,
            "history": recent.iter().map(|m| serde_json::json!({
                "role": m.role,
                "content": m.content,
            })).collect::<Vec<_>>(),
            "template": template,
            "template_version": template_version,
            "bypass_single_result": false,
            "require_approval": req.require_approval,
        });

        let workflow_id = format!("task-{}-{}", caller.user_id, Utc::now().timestamp());

        let mut memo = HashMap::new();
        memo.insert("user_id".to_string(), serde_json::json!(caller.user_id));
        memo.insert("session_id".to_string(), serde_json::json!(session.id.to_string()));
        memo.insert("tenant_id".to_string(), serde_json::json!(caller.tenant_id));
        memo.insert("query".to_string(), serde_json::json!(req.query));
        memo.insert("mode".to_string(), serde_json::json!(decision.mode.as_str()));
        if let Some(t) = &template {
            memo.insert("template".to_string(), serde_json::json!(t));
        }
        if let Some(v) = &template_version {
            memo.insert("template_version".to_string(), serde_json::json!(v));
        }
        memo.insert("disable_ai".to_string(), serde_json::json!(disable_ai));

        // Step 7: compact pre-flight event, best-effort.
        let estimated_prompt_tokens = recent.iter().map(|m| (m.content.len() / 4) as i64).sum::<i64>();
        let preflight = EventRecord {
            workflow_id: workflow_id.clone(),
            event_type: "SUBMISSION_PREFLIGHT".to_string(),
            agent_id: None,
            message: Some(format!("estimated_prompt_tokens={estimated_prompt_tokens}")),
            payload: serde_json::json!({ "estimated_prompt_tokens": estimated_prompt_tokens }),
            timestamp: Utc::now(),
            seq: 0,
            stream_id: StreamId(String::new()),
        };
        if let Err(e) = self.bus.publish(preflight).await {
            tracing::warn!(error = %e, workflow_id = %workflow_id, "pre-flight event publish failed");
        }

        // Step 8: start the workflow.
        self.engine
            .start(
                StartOptions {
                    task_queue: decision.queue.to_string(),
                    workflow_id: workflow_id.clone(),
                    memo: Memo(memo),
                    cron_expression: decision.cron_expression.clone(),
                },
                decision.variant,
                input,
            )
            .await?;

        // Step 9: synchronous initial RUNNING row.
        let task = TaskExecution::new_running(
            workflow_id.clone(),
            caller.user_id.clone(),
            caller.tenant_id.clone(),
            session.id.to_string(),
            req.query.clone(),
            decision.mode,
        );
        self.ledger.create_initial(&task).await?;

        // Step 10: spawn the detached finalizer.
        self.finalizer.spawn(workflow_id.clone(), String::new());

        Ok(SubmitResponse {
            workflow_id,
            task_id: task.id,
            session_id: session.id,
            mode: decision.mode,
            complexity_score: 0.5,
        })
    }

    /// Composes the unified status response, merging C4's describe with
    /// C2's ledger aggregates.
    pub async fn get_status(&self, caller: &CallerContext, workflow_id: &str) -> Result<UnifiedStatus> {
        caller.require_authenticated()?;

        let describe = match self.describe_reconciling_completion(workflow_id).await {
            Ok(d) => d,
            Err(CoreError::NotFound(_)) => return self.status_from_ledger_fallback(caller, workflow_id).await,
            Err(e) => return Err(e),
        };

        enforce_tenant(caller, describe.memo.tenant_id().unwrap_or_default(), "task")?;
        enforce_owner(caller, describe.memo.user_id(), "task")?;

        let task = self.ledger.get_by_workflow_id(workflow_id).await?;
        let mode = task.as_ref().map(|t| t.mode).unwrap_or(ModeLabel::Standard);
        let status = describe.status.to_task_status();

        let (result, error_message) = if describe.status.is_terminal() {
            match self.engine.get_result(workflow_id, "").await? {
                WorkflowResult::Value(v) => (v.as_str().map(str::to_string).or(Some(v.to_string())), None),
                WorkflowResult::NotFound => (None, Some("result not found".to_string())),
            }
        } else {
            (None, None)
        };

        let (total, prompt, completion, cost, agent_usages) = if let Some(task) = &task {
            if status.is_terminal() {
                let aggregate = self.ledger.aggregate_tokens(task.id).await?;
                let usages = self.ledger.aggregate_agent_usages(task.id).await?;
                let mut merged = task.clone();
                meridian_core::task::merge_token_totals(&mut merged, aggregate);
                (merged.total_tokens, merged.prompt_tokens, merged.completion_tokens, merged.total_cost_usd, usages)
            } else {
                (task.total_tokens, task.prompt_tokens, task.completion_tokens, task.total_cost_usd, Vec::new())
            }
        } else {
            (0, 0, 0, 0.0, Vec::new())
        };

        let metadata_stop_reason = task.as_ref().and_then(|t| {
            t.metadata
                .get("stop_reason")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        });
        let stop_reason = stop_reason::stop_reason(
            metadata_stop_reason.as_deref(),
            task.as_ref().and_then(|t| t.metadata.get("max_tokens_reached").and_then(|v| v.as_bool())).unwrap_or(false),
            task.as_ref().and_then(|t| t.metadata.get("timeout").and_then(|v| v.as_bool())).unwrap_or(false),
            status,
        );

        Ok(UnifiedStatus {
            task_id: workflow_id.to_string(),
            status,
            progress: if status.is_terminal() { "done".to_string() } else { "running".to_string() },
            result,
            mode,
            total_tokens: total,
            prompt_tokens: prompt,
            completion_tokens: completion,
            cost_usd: cost,
            agent_usages,
            error: error_message,
            stop_reason: Some(stop_reason),
            duration_ms: task.and_then(|t| t.duration_ms),
        })
    }

    /// Closes the race where the engine still reports `RUNNING` but the
    /// Event Bus already carries `WORKFLOW_COMPLETED`: a brief bounded
    /// retry loop re-describes until the engine catches up.
    async fn describe_reconciling_completion(
        &self,
        workflow_id: &str,
    ) -> Result<meridian_core::engine::DescribeResult> {
        let mut describe = self.engine.describe(workflow_id).await?;
        if describe.status == EngineStatus::Running {
            if let Ok(events) = self.bus.replay_since(workflow_id, 0).await {
                let completed = events.iter().any(|e| e.event_type == event_type::WORKFLOW_COMPLETED);
                if completed {
                    for _ in 0..3 {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        describe = self.engine.describe(workflow_id).await?;
                        if describe.status != EngineStatus::Running {
                            break;
                        }
                    }
                }
            }
        }
        Ok(describe)
    }

    /// The engine reports the workflow as not-found (retention expired);
    /// serve status from the ledger row instead, still tenant-enforced.
    async fn status_from_ledger_fallback(
        &self,
        caller: &CallerContext,
        workflow_id: &str,
    ) -> Result<UnifiedStatus> {
        let task = self
            .ledger
            .get_by_workflow_id(workflow_id)
            .await?
            .ok_or_else(|| CoreError::not_found("task"))?;
        enforce_tenant(caller, &task.tenant_id, "task")?;
        enforce_owner(caller, Some(&task.user_id), "task")?;

        let aggregate = self.ledger.aggregate_tokens(task.id).await?;
        let usages = self.ledger.aggregate_agent_usages(task.id).await?;
        let mut merged = task.clone();
        meridian_core::task::merge_token_totals(&mut merged, aggregate);

        let stop_reason = stop_reason::stop_reason(
            task.metadata.get("stop_reason").and_then(|v| v.as_str()),
            task.metadata.get("max_tokens_reached").and_then(|v| v.as_bool()).unwrap_or(false),
            task.metadata.get("timeout").and_then(|v| v.as_bool()).unwrap_or(false),
            task.status,
        );

        Ok(UnifiedStatus {
            task_id: workflow_id.to_string(),
            status: task.status,
            progress: if task.status.is_terminal() { "done".to_string() } else { "running".to_string() },
            result: merged.result,
            mode: task.mode,
            total_tokens: merged.total_tokens,
            prompt_tokens: merged.prompt_tokens,
            completion_tokens: merged.completion_tokens,
            cost_usd: merged.total_cost_usd,
            agent_usages: usages,
            error: merged.error_message,
            stop_reason: Some(stop_reason),
            duration_ms: merged.duration_ms,
        })
    }

}
