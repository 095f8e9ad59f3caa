use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use chrono::Utc;

use crate::engine::{
    DescribeResult, EngineClient, EngineStatus, Memo, StartOptions, WorkflowResult,
};
use crate::error::{CoreError, Result};
use crate::router::WorkflowVariant;

#[derive(Debug, Clone)]
struct FakeWorkflow {
    status: EngineStatus,
    start_time: chrono::DateTime<Utc>,
    close_time: Option<chrono::DateTime<Utc>>,
    memo: Memo,
    result: Option<serde_json::Value>,
    queries: HashMap<String, serde_json::Value>,
}

/// A recorded `signal` call, for assertions in C9/C10 tests (e.g. "the
/// workflow received `research-plan-approved-<wf>` with the right payload").
#[derive(Debug, Clone)]
pub struct RecordedSignal {
    pub workflow_id: String,
    pub signal_name: String,
    pub payload: serde_json::Value,
}

/// In-memory [`EngineClient`] fake. Workflows are seeded with [`Self::seed`]
/// and advanced with [`Self::set_status`]; `start`/`signal`/`cancel` record
/// their calls for assertions instead of driving any real execution, since
/// workflow *bodies* are out of scope for this core.
#[derive(Default)]
pub struct FakeEngineClient {
    workflows: Mutex<HashMap<String, FakeWorkflow>>,
    signals: Mutex<Vec<RecordedSignal>>,
    cancelled: Mutex<Vec<String>>,
    /// When true, every `describe` call fails — used to exercise the
    /// Terminal-State Finalizer's bounded-retry give-up path.
    always_fail_describe: bool,
}

impl FakeEngineClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose `describe` always errors, for finalizer give-up tests.
    pub fn always_failing_describe() -> Self {
        Self {
            always_fail_describe: true,
            ..Default::default()
        }
    }

    pub fn seed(&self, workflow_id: impl Into<String>, memo: Memo) {
        let id = workflow_id.into();
        self.workflows.lock().unwrap().insert(
            id,
            FakeWorkflow {
                status: EngineStatus::Running,
                start_time: Utc::now(),
                close_time: None,
                memo,
                result: None,
                queries: HashMap::new(),
            },
        );
    }

    pub fn set_status(&self, workflow_id: &str, status: EngineStatus) {
        if let Some(wf) = self.workflows.lock().unwrap().get_mut(workflow_id) {
            wf.status = status;
            if status.is_terminal() && wf.close_time.is_none() {
                wf.close_time = Some(Utc::now());
            }
        }
    }

    pub fn set_result(&self, workflow_id: &str, result: serde_json::Value) {
        if let Some(wf) = self.workflows.lock().unwrap().get_mut(workflow_id) {
            wf.result = Some(result);
        }
    }

    pub fn set_query_response(&self, workflow_id: &str, query_name: &str, value: serde_json::Value) {
        if let Some(wf) = self.workflows.lock().unwrap().get_mut(workflow_id) {
            wf.queries.insert(query_name.to_string(), value);
        }
    }

    pub fn recorded_signals(&self) -> Vec<RecordedSignal> {
        self.signals.lock().unwrap().clone()
    }

    pub fn is_cancelled(&self, workflow_id: &str) -> bool {
        self.cancelled.lock().unwrap().iter().any(|w| w == workflow_id)
    }

    pub fn exists(&self, workflow_id: &str) -> bool {
        self.workflows.lock().unwrap().contains_key(workflow_id)
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

impl EngineClient for FakeEngineClient {
    fn start<'a>(
        &'a self,
        options: StartOptions,
        _variant: WorkflowVariant,
        _input: serde_json::Value,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.workflows.lock().unwrap().insert(
                options.workflow_id,
                FakeWorkflow {
                    status: EngineStatus::Running,
                    start_time: Utc::now(),
                    close_time: None,
                    memo: options.memo,
                    result: None,
                    queries: HashMap::new(),
                },
            );
            Ok(())
        })
    }

    fn describe<'a>(&'a self, workflow_id: &'a str) -> BoxFuture<'a, DescribeResult> {
        Box::pin(async move {
            if self.always_fail_describe {
                return Err(CoreError::Unavailable("fake engine: describe always fails".into()));
            }
            let workflows = self.workflows.lock().unwrap();
            let wf = workflows
                .get(workflow_id)
                .ok_or_else(|| CoreError::not_found(workflow_id))?;
            Ok(DescribeResult {
                status: wf.status,
                start_time: wf.start_time,
                close_time: wf.close_time,
                memo: wf.memo.clone(),
            })
        })
    }

    fn cancel<'a>(&'a self, workflow_id: &'a str, _run_id: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.cancelled.lock().unwrap().push(workflow_id.to_string());
            Ok(())
        })
    }

    fn signal<'a>(
        &'a self,
        workflow_id: &'a str,
        _run_id: &'a str,
        signal_name: &'a str,
        payload: serde_json::Value,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.signals.lock().unwrap().push(RecordedSignal {
                workflow_id: workflow_id.to_string(),
                signal_name: signal_name.to_string(),
                payload,
            });
            Ok(())
        })
    }

    fn query<'a>(&'a self, workflow_id: &'a str, query_name: &'a str) -> BoxFuture<'a, serde_json::Value> {
        Box::pin(async move {
            let workflows = self.workflows.lock().unwrap();
            let wf = workflows
                .get(workflow_id)
                .ok_or_else(|| CoreError::not_found(workflow_id))?;
            Ok(wf.queries.get(query_name).cloned().unwrap_or(serde_json::Value::Null))
        })
    }

    fn get_result<'a>(&'a self, workflow_id: &'a str, _run_id: &'a str) -> BoxFuture<'a, WorkflowResult> {
        Box::pin(async move {
            let workflows = self.workflows.lock().unwrap();
            match workflows.get(workflow_id) {
                Some(wf) => match &wf.result {
                    Some(v) => Ok(WorkflowResult::Value(v.clone())),
                    None => Ok(WorkflowResult::NotFound),
                },
                None => Ok(WorkflowResult::NotFound),
            }
        })
    }

    fn create_cron_schedule<'a>(&'a self, _options: StartOptions) -> BoxFuture<'a, ()> {
        Box::pin(async move { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_workflow_describes() {
        let fake = FakeEngineClient::new();
        let mut memo = HashMap::new();
        memo.insert("tenant_id".to_string(), serde_json::json!("t1"));
        fake.seed("wf-1", Memo(memo));
        let d = fake.describe("wf-1").await.unwrap();
        assert_eq!(d.status, EngineStatus::Running);
        assert_eq!(d.memo.tenant_id(), Some("t1"));
    }

    #[tokio::test]
    async fn always_failing_describe_errors_every_time() {
        let fake = FakeEngineClient::always_failing_describe();
        fake.seed("wf-1", Memo::default());
        for _ in 0..3 {
            assert!(fake.describe("wf-1").await.is_err());
        }
    }

    #[tokio::test]
    async fn signal_is_recorded() {
        let fake = FakeEngineClient::new();
        fake.seed("wf-1", Memo::default());
        fake.signal("wf-1", "run-1", "human-approval-a1", serde_json::json!({"approved": true}))
            .await
            .unwrap();
        let signals = fake.recorded_signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_name, "human-approval-a1");
    }

    #[tokio::test]
    async fn cancel_is_recorded() {
        let fake = FakeEngineClient::new();
        fake.seed("wf-1", Memo::default());
        fake.cancel("wf-1", "run-1").await.unwrap();
        assert!(fake.is_cancelled("wf-1"));
    }
}
