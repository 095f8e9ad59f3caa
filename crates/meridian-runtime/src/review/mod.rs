//! C9: the Review Coordinator's runtime wiring. The state machine itself
//! (`apply_feedback`/`mark_approved`/optimistic-concurrency checks) lives in
//! `meridian_core::review`; this module persists [`ReviewState`] in Redis
//! with its own TTL, drives the detached call to the review LLM
//! collaborator, publishes the resulting events on the Event Bus, and
//! signals the engine on approval.

mod store;

pub use store::ReviewStore;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use meridian_core::engine::EngineClient;
use meridian_core::error::{CoreError, Result};
use meridian_core::event::{event_type, EventRecord, StreamId};
use meridian_core::review::{ReviewIntent, ReviewLlmClient, ReviewState};
use meridian_core::task::TokenUsageLine;
use meridian_core::tenant::{enforce_tenant, CallerContext};

use crate::event_bus::EventBus;
use crate::ledger::Ledger;

const LLM_CALL_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ReviewCoordinator {
    store: ReviewStore,
    llm: Arc<dyn ReviewLlmClient>,
    bus: Arc<EventBus>,
    engine: Arc<dyn EngineClient>,
    ledger: Ledger,
}

impl ReviewCoordinator {
    pub fn new(
        store: ReviewStore,
        llm: Arc<dyn ReviewLlmClient>,
        bus: Arc<EventBus>,
        engine: Arc<dyn EngineClient>,
        ledger: Ledger,
    ) -> Self {
        Self { store, llm, bus, engine, ledger }
    }

    /// Starts a review session for a workflow that has entered human review.
    /// Idempotent: a second call for the same workflow id is a no-op and
    /// returns the existing state, since the workflow side may retry its
    /// "enter review" signal without knowing whether the first attempt
    /// landed.
    pub async fn start(
        &self,
        caller: &CallerContext,
        workflow_id: &str,
        query: &str,
        initial_plan: &str,
    ) -> Result<ReviewState> {
        caller.require_authenticated()?;
        if let Some(existing) = self.store.get(workflow_id).await? {
            return Ok(existing);
        }
        let state = ReviewState::new(workflow_id, query, &caller.user_id, &caller.tenant_id, initial_plan);
        self.store.put(&state).await?;
        Ok(state)
    }

    fn load_owned(&self, state: Option<ReviewState>, caller: &CallerContext, workflow_id: &str) -> Result<ReviewState> {
        let state = state.ok_or_else(|| CoreError::not_found("review"))?;
        state.check_owner(&caller.user_id)?;
        enforce_tenant(caller, &state.owner_tenant, "review")?;
        Ok(state)
    }

    /// One feedback round: validates `If-Match`, calls the review LLM on a
    /// detached task (so a client disconnect doesn't abort the in-flight
    /// call), applies the result, persists, and publishes both
    /// `REVIEW_USER_FEEDBACK` and `RESEARCH_PLAN_UPDATED`.
    pub async fn submit_feedback(
        &self,
        caller: &CallerContext,
        workflow_id: &str,
        if_match_version: i64,
        message: &str,
    ) -> Result<ReviewState> {
        caller.require_authenticated()?;
        let mut state = self.load_owned(self.store.get(workflow_id).await?, caller, workflow_id)?;
        state.check_if_match(if_match_version)?;

        let llm = Arc::clone(&self.llm);
        let query = state.query.clone();
        let context = state.context.clone();
        let rounds = state.rounds.clone();
        let message_owned = message.to_string();
        let join = tokio::spawn(async move {
            tokio::time::timeout(LLM_CALL_TIMEOUT, llm.respond(&query, &context, &rounds, &message_owned)).await
        });
        let response = join
            .await
            .map_err(|e| CoreError::Internal(format!("review llm task panicked: {e}")))?
            .map_err(|_| CoreError::Unavailable("review llm collaborator timed out".to_string()))??;

        state.apply_feedback(message, response.message.clone(), response.intent, response.updated_plan.clone());
        self.store.put(&state).await?;

        self.publish_best_effort(workflow_id, event_type::REVIEW_USER_FEEDBACK, Some(message.to_string())).await;
        if response.intent != ReviewIntent::Approve {
            self.publish_best_effort(
                workflow_id,
                event_type::RESEARCH_PLAN_UPDATED,
                Some(state.current_plan.clone()),
            )
            .await;
        }

        self.record_usage_best_effort(workflow_id, response.prompt_tokens, response.completion_tokens);

        Ok(state)
    }

    /// Marks the review approved and signals the workflow with the final
    /// plan and full conversation so it can resume past the review gate.
    pub async fn approve(&self, caller: &CallerContext, workflow_id: &str, if_match_version: i64) -> Result<ReviewState> {
        caller.require_authenticated()?;
        let mut state = self.load_owned(self.store.get(workflow_id).await?, caller, workflow_id)?;
        state.check_if_match(if_match_version)?;
        state.mark_approved();
        self.store.put(&state).await?;

        let payload = serde_json::json!({
            "approved": true,
            "final_plan": state.current_plan,
            "conversation": state.rounds,
        });
        self.engine
            .signal(workflow_id, "", &format!("research-plan-approved-{workflow_id}"), payload)
            .await?;
        Ok(state)
    }

    pub async fn get(&self, caller: &CallerContext, workflow_id: &str) -> Result<ReviewState> {
        caller.require_authenticated()?;
        self.load_owned(self.store.get(workflow_id).await?, caller, workflow_id)
    }

    async fn publish_best_effort(&self, workflow_id: &str, event_type: &str, message: Option<String>) {
        let event = EventRecord {
            workflow_id: workflow_id.to_string(),
            event_type: event_type.to_string(),
            agent_id: None,
            message,
            payload: serde_json::Value::Null,
            timestamp: Utc::now(),
            seq: 0,
            stream_id: StreamId(String::new()),
        };
        if let Err(e) = self.bus.publish(event).await {
            tracing::warn!(error = %e, workflow_id, event_type, "review event publish failed");
        }
    }

    /// Best-effort, detached: a failure here must never fail the feedback
    /// turn the caller is waiting on.
    fn record_usage_best_effort(&self, workflow_id: &str, prompt_tokens: i64, completion_tokens: i64) {
        if prompt_tokens == 0 && completion_tokens == 0 {
            return;
        }
        let ledger = self.ledger.clone();
        let workflow_id = workflow_id.to_string();
        tokio::spawn(async move {
            let Ok(Some(task)) = ledger.get_by_workflow_id(&workflow_id).await else {
                return;
            };
            let line = TokenUsageLine {
                task_id: task.id,
                agent_id: "review-coordinator".to_string(),
                model: "unknown".to_string(),
                provider: "unknown".to_string(),
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
                cost_usd: 0.0,
                created_at: Utc::now(),
            };
            if let Err(e) = ledger.record_token_usage(&line).await {
                tracing::warn!(error = %e, workflow_id, "review usage recording failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::testing::FakeReviewLlm;

    // Exercised against a real Redis-backed `ReviewStore` in `meridian-runtime`'s
    // integration tests; these cover the pure wiring decisions that don't need one.

    #[test]
    fn llm_call_timeout_is_60s() {
        assert_eq!(LLM_CALL_TIMEOUT, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn fake_llm_default_response_is_feedback_intent() {
        let llm = FakeReviewLlm::new();
        let response = llm.respond("q", &serde_json::json!({}), &[], "be more specific").await.unwrap();
        assert_eq!(response.intent, ReviewIntent::Feedback);
    }
}
