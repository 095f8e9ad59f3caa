use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use crate::error::Result;
use crate::review::{ReviewIntent, ReviewLlmClient, ReviewLlmResponse, ReviewRound};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Scriptable [`ReviewLlmClient`] fake. By default it echoes a `feedback`
/// intent with a plan bumped from the round count; call
/// [`Self::queue_response`] to script a specific reply (e.g. `approve`) for
/// the next call.
#[derive(Default)]
pub struct FakeReviewLlm {
    queued: Mutex<Vec<ReviewLlmResponse>>,
    calls: Mutex<Vec<String>>,
}

impl FakeReviewLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_response(&self, response: ReviewLlmResponse) {
        self.queued.lock().unwrap().push(response);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl ReviewLlmClient for FakeReviewLlm {
    fn respond<'a>(
        &'a self,
        _query: &'a str,
        _context: &'a serde_json::Value,
        rounds: &'a [ReviewRound],
        user_message: &'a str,
    ) -> BoxFuture<'a, ReviewLlmResponse> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(user_message.to_string());
            if let Some(next) = self.queued.lock().unwrap().pop() {
                return Ok(next);
            }
            Ok(ReviewLlmResponse {
                message: format!("acknowledged round {}", rounds.len() / 2 + 1),
                intent: ReviewIntent::Feedback,
                updated_plan: Some(format!("plan revision {}", rounds.len() / 2 + 1)),
                prompt_tokens: 120,
                completion_tokens: 40,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_response_is_feedback() {
        let llm = FakeReviewLlm::new();
        let resp = llm.respond("q", &serde_json::json!({}), &[], "be specific").await.unwrap();
        assert_eq!(resp.intent, ReviewIntent::Feedback);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn queued_response_takes_priority() {
        let llm = FakeReviewLlm::new();
        llm.queue_response(ReviewLlmResponse {
            message: "looks good".into(),
            intent: ReviewIntent::Approve,
            updated_plan: None,
            prompt_tokens: 10,
            completion_tokens: 5,
        });
        let resp = llm.respond("q", &serde_json::json!({}), &[], "approve").await.unwrap();
        assert_eq!(resp.intent, ReviewIntent::Approve);
    }
}
