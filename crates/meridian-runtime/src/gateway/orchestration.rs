//! The `OrchestrationService` gRPC surface: thin request/response
//! conversion over C6 (submit/status), C10 (control plane), C9 (review),
//! and the ledger/session-store reads `ListTasks`/`GetSessionContext` need.
//! Caller identity arrives as plain fields on each request — the upstream
//! HTTP gateway's auth middleware (an out-of-scope collaborator) has
//! already authenticated the caller and forwarded `user_id`/`tenant_id` by
//! the time a request reaches this service.

use std::sync::Arc;

use meridian_core::control::ControlState;
use meridian_core::error::CoreError;
use meridian_core::task::{TaskStatus, TokenUsageLine};
use meridian_core::tenant::CallerContext;
use tonic::{Request, Response, Status};

use crate::control::ControlPlaneService;
use crate::ledger::{Ledger, TaskListFilter};
use crate::pb::orchestration as pb;
use crate::review::ReviewCoordinator;
use crate::session_store::SessionStore;
use crate::submission::{SubmissionService, SubmitRequest};

use super::convert;
use super::error::to_status;

fn caller_from(user_id: &str, tenant_id: &str) -> CallerContext {
    if user_id.is_empty() {
        CallerContext::anonymous()
    } else {
        CallerContext::new(user_id, tenant_id)
    }
}

pub struct OrchestrationGateway {
    submissions: Arc<SubmissionService>,
    control: Arc<ControlPlaneService>,
    review: Arc<ReviewCoordinator>,
    sessions: SessionStore,
    ledger: Ledger,
}

impl OrchestrationGateway {
    pub fn new(
        submissions: Arc<SubmissionService>,
        control: Arc<ControlPlaneService>,
        review: Arc<ReviewCoordinator>,
        sessions: SessionStore,
        ledger: Ledger,
    ) -> Self {
        Self { submissions, control, review, sessions, ledger }
    }
}

#[tonic::async_trait]
impl pb::orchestration_service_server::OrchestrationService for OrchestrationGateway {
    async fn submit_task(
        &self,
        request: Request<pb::SubmitTaskRequest>,
    ) -> Result<Response<pb::SubmitTaskResponse>, Status> {
        let req = request.into_inner();
        let caller = caller_from(&req.user_id, &req.tenant_id);
        let context = req.context.as_ref().map(crate::pb_json::struct_to_json).unwrap_or_default();

        let submit_req = SubmitRequest {
            query: req.query,
            session_id_or_alias: (!req.session_id.is_empty()).then_some(req.session_id),
            labels: convert::labels_to_map(req.labels.as_ref()),
            context,
            manual_decomposition_mode: req.manual_decomposition.and_then(|m| (!m.mode.is_empty()).then_some(m.mode)),
            require_approval: req.require_approval,
        };

        let resp = self
            .submissions
            .submit(&caller, submit_req)
            .await
            .map_err(to_status)?;

        Ok(Response::new(pb::SubmitTaskResponse {
            workflow_id: resp.workflow_id,
            task_id: resp.task_id.to_string(),
            status: TaskStatus::Running.as_str().to_string(),
            message: String::new(),
            session_id: resp.session_id.to_string(),
            mode: resp.mode.as_str().to_string(),
            complexity_score: resp.complexity_score,
        }))
    }

    async fn get_task_status(
        &self,
        request: Request<pb::GetTaskStatusRequest>,
    ) -> Result<Response<pb::GetTaskStatusResponse>, Status> {
        let req = request.into_inner();
        let caller = caller_from(&req.user_id, &req.tenant_id);
        let status = self
            .submissions
            .get_status(&caller, &req.task_id)
            .await
            .map_err(to_status)?;
        Ok(Response::new(convert::unified_status_to_pb(&status)))
    }

    async fn cancel_task(&self, request: Request<pb::ControlRequest>) -> Result<Response<pb::ControlResponse>, Status> {
        let req = request.into_inner();
        let caller = caller_from(&req.user_id, &req.tenant_id);
        let reason = (!req.reason.is_empty()).then_some(req.reason.as_str());
        self.control.cancel(&caller, &req.workflow_id, reason).await.map_err(to_status)?;
        Ok(Response::new(pb::ControlResponse { ok: true, message: String::new() }))
    }

    async fn pause_task(&self, request: Request<pb::ControlRequest>) -> Result<Response<pb::ControlResponse>, Status> {
        let req = request.into_inner();
        let caller = caller_from(&req.user_id, &req.tenant_id);
        let reason = (!req.reason.is_empty()).then_some(req.reason.as_str());
        self.control.pause(&caller, &req.workflow_id, reason).await.map_err(to_status)?;
        Ok(Response::new(pb::ControlResponse { ok: true, message: String::new() }))
    }

    async fn resume_task(&self, request: Request<pb::ControlRequest>) -> Result<Response<pb::ControlResponse>, Status> {
        let req = request.into_inner();
        let caller = caller_from(&req.user_id, &req.tenant_id);
        let reason = (!req.reason.is_empty()).then_some(req.reason.as_str());
        self.control.resume(&caller, &req.workflow_id, reason).await.map_err(to_status)?;
        Ok(Response::new(pb::ControlResponse { ok: true, message: String::new() }))
    }

    async fn get_control_state(
        &self,
        request: Request<pb::GetControlStateRequest>,
    ) -> Result<Response<pb::GetControlStateResponse>, Status> {
        let req = request.into_inner();
        let caller = caller_from(&req.user_id, &req.tenant_id);
        let ControlState { is_paused, is_cancelled, status } = self
            .control
            .get_control_state(&caller, &req.workflow_id)
            .await
            .map_err(to_status)?;
        Ok(Response::new(pb::GetControlStateResponse {
            is_paused,
            is_cancelled,
            status: status.as_str().to_string(),
        }))
    }

    async fn list_tasks(
        &self,
        request: Request<pb::ListTasksRequest>,
    ) -> Result<Response<pb::ListTasksResponse>, Status> {
        let req = request.into_inner();
        let caller = caller_from(&req.user_id, &req.tenant_id);
        caller.require_authenticated().map_err(to_status)?;

        let filter = TaskListFilter {
            user_id: caller.user_id.clone(),
            tenant_id: caller.tenant_id.clone(),
            session_id: (!req.session_id.is_empty()).then_some(req.session_id),
            status: (!req.status_filter.is_empty())
                .then(|| TaskStatus::parse(&req.status_filter))
                .flatten(),
            limit: if req.limit > 0 { req.limit as i64 } else { 50 },
            offset: req.offset.max(0) as i64,
        };
        let (tasks, total) = self.ledger.list_tasks(&filter).await.map_err(to_status)?;
        Ok(Response::new(pb::ListTasksResponse {
            tasks: tasks.iter().map(convert::task_execution_to_pb).collect(),
            total,
        }))
    }

    async fn get_session_context(
        &self,
        request: Request<pb::GetSessionContextRequest>,
    ) -> Result<Response<pb::GetSessionContextResponse>, Status> {
        let req = request.into_inner();
        let caller = caller_from(&req.user_id, &req.tenant_id);
        caller.require_authenticated().map_err(to_status)?;

        let session = self
            .sessions
            .get(&req.session_id)
            .await
            .map_err(to_status)?
            .ok_or_else(|| to_status(CoreError::not_found("session")))?;
        session.check_owner(&caller.user_id).map_err(to_status)?;

        let filter = TaskListFilter {
            user_id: caller.user_id.clone(),
            tenant_id: caller.tenant_id.clone(),
            session_id: Some(session.id.to_string()),
            status: None,
            limit: 20,
            offset: 0,
        };
        let (tasks, _total) = self.ledger.list_tasks(&filter).await.map_err(to_status)?;

        Ok(Response::new(pb::GetSessionContextResponse {
            session_id: session.id.to_string(),
            context: Some(crate::pb_json::json_to_struct(&serde_json::Value::Object(
                session.context.into_iter().collect(),
            ))),
            token_usage: session.total_tokens_used,
            recent_tasks: tasks.iter().map(convert::task_execution_to_pb).collect(),
        }))
    }

    async fn approve_task(
        &self,
        request: Request<pb::ApproveTaskRequest>,
    ) -> Result<Response<pb::ApproveTaskResponse>, Status> {
        let req = request.into_inner();
        let caller = caller_from(&req.user_id, &req.tenant_id);
        self.control
            .approve_task(
                &caller,
                &req.workflow_id,
                &req.approval_id,
                req.approved,
                (!req.feedback.is_empty()).then_some(req.feedback.as_str()),
                (!req.modified_action.is_empty()).then_some(req.modified_action.as_str()),
            )
            .await
            .map_err(to_status)?;
        Ok(Response::new(pb::ApproveTaskResponse { ok: true }))
    }

    async fn submit_review_decision(
        &self,
        request: Request<pb::SubmitReviewDecisionRequest>,
    ) -> Result<Response<pb::SubmitReviewDecisionResponse>, Status> {
        let req = request.into_inner();
        let caller = caller_from(&req.user_id, &req.tenant_id);

        let state = if req.approve {
            self.review
                .approve(&caller, &req.workflow_id, req.if_match_version)
                .await
                .map_err(to_status)?
        } else {
            self.review
                .submit_feedback(&caller, &req.workflow_id, req.if_match_version, &req.message)
                .await
                .map_err(to_status)?
        };

        Ok(Response::new(pb::SubmitReviewDecisionResponse {
            status: format!("{:?}", state.status).to_lowercase(),
            version: state.version,
            current_plan: state.current_plan,
        }))
    }

    async fn record_token_usage(
        &self,
        request: Request<pb::RecordTokenUsageRequest>,
    ) -> Result<Response<pb::RecordTokenUsageResponse>, Status> {
        let req = request.into_inner();
        let task = self
            .ledger
            .get_by_workflow_id(&req.workflow_id)
            .await
            .map_err(to_status)?
            .ok_or_else(|| to_status(CoreError::not_found("task")))?;

        let line = TokenUsageLine {
            task_id: task.id,
            agent_id: req.agent_id,
            model: req.model,
            provider: req.provider,
            prompt_tokens: req.prompt_tokens,
            completion_tokens: req.completion_tokens,
            total_tokens: req.prompt_tokens + req.completion_tokens,
            cost_usd: req.cost_usd,
            created_at: chrono::Utc::now(),
        };
        self.ledger.record_token_usage(&line).await.map_err(to_status)?;
        Ok(Response::new(pb::RecordTokenUsageResponse { ok: true }))
    }
}
