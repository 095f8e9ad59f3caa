//! C10: the Control Plane. Every operation authenticates the caller,
//! describes the workflow via C4, and enforces tenant/owner match against
//! the memo before touching anything — the same shape C6 uses, kept
//! consistent rather than re-derived per call.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use meridian_core::control::ControlState;
use meridian_core::engine::{DescribeResult, EngineClient};
use meridian_core::error::{CoreError, Result};
use meridian_core::tenant::{enforce_owner, enforce_tenant, CallerContext};

const CANCEL_GRACE_PERIOD: Duration = Duration::from_millis(100);

pub struct ControlPlaneService {
    engine: Arc<dyn EngineClient>,
}

impl ControlPlaneService {
    pub fn new(engine: Arc<dyn EngineClient>) -> Self {
        Self { engine }
    }

    async fn authorize(&self, caller: &CallerContext, workflow_id: &str) -> Result<DescribeResult> {
        caller.require_authenticated()?;
        let describe = self.engine.describe(workflow_id).await?;
        enforce_tenant(caller, describe.memo.tenant_id().unwrap_or_default(), "task")?;
        enforce_owner(caller, describe.memo.user_id(), "task")?;
        Ok(describe)
    }

    async fn query_control_state(&self, workflow_id: &str) -> Result<ControlState> {
        let value = self.engine.query(workflow_id, "control-state").await?;
        Ok(ControlState {
            is_paused: value.get("is_paused").and_then(|v| v.as_bool()).unwrap_or(false),
            is_cancelled: value.get("is_cancelled").and_then(|v| v.as_bool()).unwrap_or(false),
            status: meridian_core::task::TaskStatus::Running,
        })
    }

    /// Signals cooperative cancellation, waits a short grace period for the
    /// workflow to observe it, then forces the engine's own cancel. The
    /// signal failing (e.g. the workflow doesn't handle it) never blocks
    /// the forced cancel that follows.
    pub async fn cancel(&self, caller: &CallerContext, workflow_id: &str, reason: Option<&str>) -> Result<()> {
        self.authorize(caller, workflow_id).await?;
        let payload = serde_json::json!({ "reason": reason, "requested_at": Utc::now() });
        if let Err(e) = self.engine.signal(workflow_id, "", "task-cancel-requested", payload).await {
            tracing::warn!(error = %e, workflow_id, "cooperative cancel signal failed, forcing cancel");
        }
        tokio::time::sleep(CANCEL_GRACE_PERIOD).await;
        self.engine.cancel(workflow_id, "").await
    }

    pub async fn pause(&self, caller: &CallerContext, workflow_id: &str, reason: Option<&str>) -> Result<()> {
        let describe = self.authorize(caller, workflow_id).await?;
        if describe.status.is_terminal() {
            return Err(CoreError::FailedPrecondition(format!(
                "cannot pause task {workflow_id}: already terminal"
            )));
        }
        let state = self.query_control_state(workflow_id).await?;
        if state.is_paused {
            return Err(CoreError::FailedPrecondition(format!("task {workflow_id} is already paused")));
        }
        let payload = serde_json::json!({ "reason": reason, "requested_at": Utc::now() });
        self.engine.signal(workflow_id, "", "task-pause", payload).await
    }

    pub async fn resume(&self, caller: &CallerContext, workflow_id: &str, reason: Option<&str>) -> Result<()> {
        let describe = self.authorize(caller, workflow_id).await?;
        if describe.status.is_terminal() {
            return Err(CoreError::FailedPrecondition(format!(
                "cannot resume task {workflow_id}: already terminal"
            )));
        }
        let state = self.query_control_state(workflow_id).await?;
        if !state.is_paused {
            return Err(CoreError::FailedPrecondition(format!("task {workflow_id} is not paused")));
        }
        let payload = serde_json::json!({ "reason": reason, "requested_at": Utc::now() });
        self.engine.signal(workflow_id, "", "task-resume", payload).await
    }

    pub async fn get_control_state(&self, caller: &CallerContext, workflow_id: &str) -> Result<ControlState> {
        let describe = self.authorize(caller, workflow_id).await?;
        let mut state = self.query_control_state(workflow_id).await?;
        state.status = describe.status.to_task_status();
        Ok(state)
    }

    /// Human-in-the-loop approval gate distinct from the review coordinator:
    /// identified by a caller-supplied `approval_id` rather than a review
    /// round, and signaled on a per-approval name so a workflow waiting on
    /// several concurrent approvals can tell them apart.
    pub async fn approve_task(
        &self,
        caller: &CallerContext,
        workflow_id: &str,
        approval_id: &str,
        approved: bool,
        feedback: Option<&str>,
        modified_action: Option<&str>,
    ) -> Result<()> {
        self.authorize(caller, workflow_id).await?;
        let signal_name = format!("human-approval-{approval_id}");
        let payload = serde_json::json!({
            "approved": approved,
            "feedback": feedback,
            "modified_action": modified_action,
            "approved_by": caller.user_id,
            "timestamp": Utc::now(),
        });
        self.engine.signal(workflow_id, "", &signal_name, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::engine::Memo;
    use meridian_core::testing::FakeEngineClient;
    use std::collections::HashMap;

    fn caller() -> CallerContext {
        CallerContext::new("u1", "t1")
    }

    fn memo() -> Memo {
        let mut m = HashMap::new();
        m.insert("user_id".to_string(), serde_json::json!("u1"));
        m.insert("tenant_id".to_string(), serde_json::json!("t1"));
        Memo(m)
    }

    fn seeded(status: meridian_core::engine::EngineStatus) -> (ControlPlaneService, Arc<FakeEngineClient>) {
        let fake = Arc::new(FakeEngineClient::new());
        fake.seed("wf-1", memo());
        fake.set_status("wf-1", status);
        (ControlPlaneService::new(fake.clone()), fake)
    }

    #[tokio::test]
    async fn cancel_sends_cooperative_signal_then_forces_cancel() {
        let (svc, fake) = seeded(meridian_core::engine::EngineStatus::Running);
        svc.cancel(&caller(), "wf-1", Some("user requested")).await.unwrap();
        assert!(fake.is_cancelled("wf-1"));
        let signals = fake.recorded_signals();
        assert!(signals.iter().any(|s| s.signal_name == "task-cancel-requested"));
    }

    #[tokio::test]
    async fn pause_rejects_terminal_workflow() {
        let (svc, _fake) = seeded(meridian_core::engine::EngineStatus::Completed);
        let err = svc.pause(&caller(), "wf-1", None).await.unwrap_err();
        assert!(matches!(err, CoreError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn double_pause_fails_failed_precondition() {
        let (svc, fake) = seeded(meridian_core::engine::EngineStatus::Running);
        svc.pause(&caller(), "wf-1", Some("r1")).await.unwrap();
        fake.set_query_response("wf-1", "control-state", serde_json::json!({"is_paused": true}));
        let err = svc.pause(&caller(), "wf-1", Some("r2")).await.unwrap_err();
        assert!(matches!(err, CoreError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn resume_without_pause_fails_failed_precondition() {
        let (svc, _fake) = seeded(meridian_core::engine::EngineStatus::Running);
        let err = svc.resume(&caller(), "wf-1", None).await.unwrap_err();
        assert!(matches!(err, CoreError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn pause_then_resume_round_trips() {
        let (svc, fake) = seeded(meridian_core::engine::EngineStatus::Running);
        svc.pause(&caller(), "wf-1", None).await.unwrap();
        fake.set_query_response("wf-1", "control-state", serde_json::json!({"is_paused": true}));
        svc.resume(&caller(), "wf-1", None).await.unwrap();
    }

    #[tokio::test]
    async fn foreign_tenant_gets_not_found() {
        let (svc, _fake) = seeded(meridian_core::engine::EngineStatus::Running);
        let other = CallerContext::new("u2", "t2");
        let err = svc.cancel(&other, "wf-1", None).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn approve_task_signals_per_approval_id() {
        let (svc, fake) = seeded(meridian_core::engine::EngineStatus::Running);
        svc.approve_task(&caller(), "wf-1", "appr-9", true, Some("looks good"), None)
            .await
            .unwrap();
        let signals = fake.recorded_signals();
        assert!(signals.iter().any(|s| s.signal_name == "human-approval-appr-9"));
    }
}
