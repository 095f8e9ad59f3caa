use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Reviewing,
    Approved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRound {
    pub role: RoundRole,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Intent the assistant's response carries, as classified by the review LLM
/// collaborator. Only `Approve` suppresses a `current_plan` update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewIntent {
    Feedback,
    Approve,
}

/// A stateful, multi-round human-in-the-loop review session, keyed by
/// workflow id and owned by its creating user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewState {
    pub workflow_id: String,
    pub query: String,
    pub context: serde_json::Value,
    pub status: ReviewStatus,
    pub round: i32,
    pub version: i64,
    pub owner_user: String,
    pub owner_tenant: String,
    pub rounds: Vec<ReviewRound>,
    pub current_plan: String,
}

impl ReviewState {
    pub fn new(
        workflow_id: impl Into<String>,
        query: impl Into<String>,
        owner_user: impl Into<String>,
        owner_tenant: impl Into<String>,
        initial_plan: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            query: query.into(),
            context: serde_json::json!({}),
            status: ReviewStatus::Reviewing,
            round: 0,
            version: 1,
            owner_user: owner_user.into(),
            owner_tenant: owner_tenant.into(),
            rounds: Vec::new(),
            current_plan: initial_plan.into(),
        }
    }

    /// Only `owner_user` may mutate; enforced before every feedback/approve
    /// call.
    pub fn check_owner(&self, caller_user: &str) -> Result<()> {
        if self.owner_user != caller_user {
            return Err(CoreError::not_found("review"));
        }
        Ok(())
    }

    /// Optimistic-concurrency check: `If-Match` must equal the current
    /// version exactly, or the caller observed stale state.
    pub fn check_if_match(&self, expected_version: i64) -> Result<()> {
        if expected_version != self.version {
            return Err(CoreError::Conflict {
                expected: expected_version,
                actual: self.version,
            });
        }
        Ok(())
    }

    /// Applies one feedback turn: appends both rounds, updates the plan
    /// unless the assistant's intent is `Approve`, and bumps `round`/`version`
    /// by exactly 1 (P7). Caller has already validated `If-Match`.
    pub fn apply_feedback(
        &mut self,
        user_message: impl Into<String>,
        assistant_message: impl Into<String>,
        intent: ReviewIntent,
        updated_plan: Option<String>,
    ) {
        let now = Utc::now();
        self.rounds.push(ReviewRound {
            role: RoundRole::User,
            message: user_message.into(),
            timestamp: now,
        });
        self.rounds.push(ReviewRound {
            role: RoundRole::Assistant,
            message: assistant_message.into(),
            timestamp: now,
        });
        if intent != ReviewIntent::Approve {
            if let Some(plan) = updated_plan {
                self.current_plan = plan;
            }
        }
        self.round += 1;
        self.version += 1;
    }

    pub fn mark_approved(&mut self) {
        self.status = ReviewStatus::Approved;
        self.version += 1;
    }
}

/// The assistant's response to one feedback turn, as classified by the
/// review LLM collaborator.
#[derive(Debug, Clone)]
pub struct ReviewLlmResponse {
    pub message: String,
    pub intent: ReviewIntent,
    /// Present when `intent != Approve`; the collaborator's updated plan
    /// text. Ignored by [`ReviewState::apply_feedback`] when `intent` is
    /// `Approve`.
    pub updated_plan: Option<String>,
    /// Prompt/completion token counts for best-effort usage recording.
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// The external language-model HTTP collaborator C9 calls with the full
/// rounds history on every feedback turn. Out of scope per SPEC_FULL.md §1
/// ("the language-model HTTP client used by review feedback"); this trait
/// is the only seam the core depends on, so a fake can back tests.
pub trait ReviewLlmClient: Send + Sync {
    fn respond<'a>(
        &'a self,
        query: &'a str,
        context: &'a serde_json::Value,
        rounds: &'a [ReviewRound],
        user_message: &'a str,
    ) -> BoxFuture<'a, ReviewLlmResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ReviewState {
        ReviewState::new("wf-1", "do the thing", "u1", "t1", "P0")
    }

    #[test]
    fn feedback_increments_version_by_one() {
        let mut r = sample();
        r.check_if_match(1).unwrap();
        r.apply_feedback("be specific", "ok, P1", ReviewIntent::Feedback, Some("P1".into()));
        assert_eq!(r.version, 2);
        assert_eq!(r.round, 1);
        assert_eq!(r.current_plan, "P1");
    }

    #[test]
    fn stale_if_match_is_rejected_and_state_unchanged() {
        let mut r = sample();
        r.apply_feedback("be specific", "ok, P1", ReviewIntent::Feedback, Some("P1".into()));
        let before = r.version;
        let err = r.check_if_match(1).unwrap_err();
        assert!(matches!(err, CoreError::Conflict { .. }));
        assert_eq!(r.version, before);
    }

    #[test]
    fn approve_intent_does_not_touch_plan() {
        let mut r = sample();
        r.apply_feedback("looks good", "approved", ReviewIntent::Approve, Some("should-not-apply".into()));
        assert_eq!(r.current_plan, "P0");
    }

    #[test]
    fn owner_check_rejects_non_owner() {
        let r = sample();
        assert!(matches!(r.check_owner("u2"), Err(CoreError::NotFound(_))));
    }
}
