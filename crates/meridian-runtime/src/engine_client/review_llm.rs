//! Default HTTP-backed [`ReviewLlmClient`]. The language-model itself is an
//! out-of-scope collaborator (SPEC_FULL.md §1); this is the thin `reqwest`
//! client that carries the rounds history to it and classifies the
//! response's intent, matching the "language-model HTTP client" seam named
//! in §6.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use meridian_core::error::{CoreError, Result};
use meridian_core::review::{ReviewIntent, ReviewLlmClient, ReviewLlmResponse, ReviewRound, RoundRole};
use serde::{Deserialize, Serialize};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

#[derive(Serialize)]
struct ReviewRequestBody<'a> {
    query: &'a str,
    context: &'a serde_json::Value,
    rounds: Vec<RoundDto<'a>>,
    user_message: &'a str,
}

#[derive(Serialize)]
struct RoundDto<'a> {
    role: &'static str,
    message: &'a str,
}

#[derive(Deserialize)]
struct ReviewResponseBody {
    message: String,
    intent: String,
    updated_plan: Option<String>,
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
}

pub struct HttpReviewLlmClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpReviewLlmClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Config(format!("review llm http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }
}

impl ReviewLlmClient for HttpReviewLlmClient {
    fn respond<'a>(
        &'a self,
        query: &'a str,
        context: &'a serde_json::Value,
        rounds: &'a [ReviewRound],
        user_message: &'a str,
    ) -> BoxFuture<'a, ReviewLlmResponse> {
        Box::pin(async move {
            let body = ReviewRequestBody {
                query,
                context,
                rounds: rounds
                    .iter()
                    .map(|r| RoundDto {
                        role: match r.role {
                            RoundRole::User => "user",
                            RoundRole::Assistant => "assistant",
                        },
                        message: &r.message,
                    })
                    .collect(),
                user_message,
            };

            let resp = self
                .http
                .post(format!("{}/v1/review/respond", self.base_url))
                .json(&body)
                .send()
                .await
                .map_err(|e| CoreError::Unavailable(format!("review llm request failed: {e}")))?;

            if !resp.status().is_success() {
                return Err(CoreError::Unavailable(format!(
                    "review llm returned status {}",
                    resp.status()
                )));
            }

            let parsed: ReviewResponseBody = resp
                .json()
                .await
                .map_err(|e| CoreError::Internal(format!("review llm response decode failed: {e}")))?;

            let intent = match parsed.intent.as_str() {
                "approve" => ReviewIntent::Approve,
                _ => ReviewIntent::Feedback,
            };

            Ok(ReviewLlmResponse {
                message: parsed.message,
                intent,
                updated_plan: parsed.updated_plan,
                prompt_tokens: parsed.prompt_tokens,
                completion_tokens: parsed.completion_tokens,
            })
        })
    }
}
