use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::router::WorkflowVariant;

/// Engine-reported workflow status, distinct from [`crate::task::TaskStatus`]
/// — the facade translates between the two at the C6/C7 boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

/// The memo map the engine returns on describe. `user_id`/`session_id`/
/// `tenant_id`/`query`/`mode` are always present for workflows started
/// through this core; the rest are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Memo(pub HashMap<String, serde_json::Value>);

impl Memo {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.get_str("tenant_id")
    }

    pub fn user_id(&self) -> Option<&str> {
        self.get_str("user_id")
    }
}

#[derive(Debug, Clone)]
pub struct DescribeResult {
    pub status: EngineStatus,
    pub start_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
    pub memo: Memo,
}

#[derive(Debug, Clone)]
pub struct StartOptions {
    pub task_queue: String,
    /// Client-supplied workflow identifier, of the form `task-<user>-<unix>`.
    pub workflow_id: String,
    pub memo: Memo,
    pub cron_expression: Option<String>,
}

/// Result of a completed workflow, or a typed "not found" when the engine
/// has already expired the workflow's retention window.
#[derive(Debug, Clone)]
pub enum WorkflowResult {
    Value(serde_json::Value),
    NotFound,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Thin typed wrapper over the durable workflow engine. The engine itself
/// and the workflow bodies it runs are out of scope; this trait is the only
/// seam the rest of the core depends on, so it can be backed by a real gRPC
/// client in production and an in-memory fake in tests.
///
/// Deliberately hand-written with `Pin<Box<dyn Future>>` rather than
/// `async-trait`, matching this codebase's existing style for object-safe
/// async traits.
pub trait EngineClient: Send + Sync {
    fn start<'a>(
        &'a self,
        options: StartOptions,
        variant: WorkflowVariant,
        input: serde_json::Value,
    ) -> BoxFuture<'a, ()>;

    fn describe<'a>(&'a self, workflow_id: &'a str) -> BoxFuture<'a, DescribeResult>;

    fn cancel<'a>(&'a self, workflow_id: &'a str, run_id: &'a str) -> BoxFuture<'a, ()>;

    fn signal<'a>(
        &'a self,
        workflow_id: &'a str,
        run_id: &'a str,
        signal_name: &'a str,
        payload: serde_json::Value,
    ) -> BoxFuture<'a, ()>;

    fn query<'a>(
        &'a self,
        workflow_id: &'a str,
        query_name: &'a str,
    ) -> BoxFuture<'a, serde_json::Value>;

    fn get_result<'a>(
        &'a self,
        workflow_id: &'a str,
        run_id: &'a str,
    ) -> BoxFuture<'a, WorkflowResult>;

    fn create_cron_schedule<'a>(&'a self, options: StartOptions) -> BoxFuture<'a, ()>;
}

impl EngineStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::TimedOut
        )
    }

    pub fn to_task_status(self) -> crate::task::TaskStatus {
        use crate::task::TaskStatus;
        match self {
            Self::Running => TaskStatus::Running,
            Self::Paused => TaskStatus::Paused,
            Self::Completed => TaskStatus::Completed,
            Self::Failed => TaskStatus::Failed,
            Self::Cancelled => TaskStatus::Cancelled,
            Self::TimedOut => TaskStatus::Timeout,
        }
    }
}
