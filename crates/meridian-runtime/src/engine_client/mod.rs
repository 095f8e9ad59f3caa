//! C4 concrete implementation: a `tonic` client over the `EngineService`
//! contract in `proto/engine.proto`, wrapping the durable workflow engine
//! (an out-of-scope collaborator) behind [`meridian_core::engine::EngineClient`].

mod review_llm;

pub use review_llm::HttpReviewLlmClient;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use meridian_core::engine::{
    DescribeResult, EngineClient, EngineStatus, Memo, StartOptions, WorkflowResult,
};
use meridian_core::error::{CoreError, Result};
use meridian_core::router::WorkflowVariant;
use tonic::transport::Channel;

use crate::pb::engine as pb;
use crate::pb_json::{json_to_struct, struct_to_json};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

#[derive(Clone)]
pub struct GrpcEngineClient {
    client: pb::engine_service_client::EngineServiceClient<Channel>,
}

impl GrpcEngineClient {
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let channel = Channel::from_shared(addr.to_string())
            .map_err(|e| CoreError::Config(format!("invalid engine address: {e}")))?
            .timeout(timeout)
            .connect()
            .await
            .map_err(|e| CoreError::Unavailable(format!("engine connect failed: {e}")))?;
        Ok(Self {
            client: pb::engine_service_client::EngineServiceClient::new(channel),
        })
    }
}

fn parse_status(s: &str) -> Result<EngineStatus> {
    match s {
        "RUNNING" => Ok(EngineStatus::Running),
        "PAUSED" => Ok(EngineStatus::Paused),
        "COMPLETED" => Ok(EngineStatus::Completed),
        "FAILED" => Ok(EngineStatus::Failed),
        "CANCELLED" => Ok(EngineStatus::Cancelled),
        "TIMED_OUT" => Ok(EngineStatus::TimedOut),
        other => Err(CoreError::Internal(format!("unrecognized engine status: {other}"))),
    }
}

fn unix_ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn variant_str(variant: WorkflowVariant) -> &'static str {
    match variant {
        WorkflowVariant::Simple => "simple",
        WorkflowVariant::Dag => "dag",
        WorkflowVariant::Supervisor => "supervisor",
        WorkflowVariant::Orchestrator => "orchestrator",
    }
}

fn map_status(e: tonic::Status) -> CoreError {
    match e.code() {
        tonic::Code::NotFound => CoreError::not_found("workflow"),
        tonic::Code::Unavailable | tonic::Code::DeadlineExceeded => {
            CoreError::Unavailable(e.message().to_string())
        }
        tonic::Code::InvalidArgument => CoreError::invalid(e.message()),
        _ => CoreError::Internal(format!("engine rpc failed: {e}")),
    }
}

impl EngineClient for GrpcEngineClient {
    fn start<'a>(
        &'a self,
        options: StartOptions,
        variant: WorkflowVariant,
        input: serde_json::Value,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut client = self.client.clone();
            client
                .start_workflow(pb::StartWorkflowRequest {
                    task_queue: options.task_queue,
                    workflow_id: options.workflow_id,
                    memo: Some(json_to_struct(&serde_json::to_value(&options.memo.0)?)),
                    cron_expression: options.cron_expression.unwrap_or_default(),
                    variant: variant_str(variant).to_string(),
                    input: Some(json_to_struct(&input)),
                })
                .await
                .map_err(map_status)?;
            Ok(())
        })
    }

    fn describe<'a>(&'a self, workflow_id: &'a str) -> BoxFuture<'a, DescribeResult> {
        Box::pin(async move {
            let mut client = self.client.clone();
            let resp = client
                .describe_workflow(pb::DescribeWorkflowRequest {
                    workflow_id: workflow_id.to_string(),
                })
                .await
                .map_err(map_status)?
                .into_inner();
            let status = parse_status(&resp.status)?;
            let memo = resp
                .memo
                .map(|s| Memo(serde_json::from_value(struct_to_json(&s)).unwrap_or_default()))
                .unwrap_or_default();
            Ok(DescribeResult {
                status,
                start_time: unix_ms_to_datetime(resp.start_time_unix_ms),
                close_time: resp.has_close_time.then(|| unix_ms_to_datetime(resp.close_time_unix_ms)),
                memo,
            })
        })
    }

    fn cancel<'a>(&'a self, workflow_id: &'a str, run_id: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut client = self.client.clone();
            client
                .cancel_workflow(pb::CancelWorkflowRequest {
                    workflow_id: workflow_id.to_string(),
                    run_id: run_id.to_string(),
                })
                .await
                .map_err(map_status)?;
            Ok(())
        })
    }

    fn signal<'a>(
        &'a self,
        workflow_id: &'a str,
        run_id: &'a str,
        signal_name: &'a str,
        payload: serde_json::Value,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut client = self.client.clone();
            client
                .signal_workflow(pb::SignalWorkflowRequest {
                    workflow_id: workflow_id.to_string(),
                    run_id: run_id.to_string(),
                    signal_name: signal_name.to_string(),
                    payload: Some(json_to_struct(&payload)),
                })
                .await
                .map_err(map_status)?;
            Ok(())
        })
    }

    fn query<'a>(
        &'a self,
        workflow_id: &'a str,
        query_name: &'a str,
    ) -> BoxFuture<'a, serde_json::Value> {
        Box::pin(async move {
            let mut client = self.client.clone();
            let resp = client
                .query_workflow(pb::QueryWorkflowRequest {
                    workflow_id: workflow_id.to_string(),
                    query_name: query_name.to_string(),
                })
                .await
                .map_err(map_status)?
                .into_inner();
            Ok(resp.result.map(|s| struct_to_json(&s)).unwrap_or(serde_json::Value::Null))
        })
    }

    fn get_result<'a>(&'a self, workflow_id: &'a str, run_id: &'a str) -> BoxFuture<'a, WorkflowResult> {
        Box::pin(async move {
            let mut client = self.client.clone();
            let resp = client
                .get_workflow_result(pb::GetWorkflowResultRequest {
                    workflow_id: workflow_id.to_string(),
                    run_id: run_id.to_string(),
                })
                .await
                .map_err(map_status)?
                .into_inner();
            if !resp.found {
                return Ok(WorkflowResult::NotFound);
            }
            Ok(WorkflowResult::Value(
                resp.value.map(|s| struct_to_json(&s)).unwrap_or(serde_json::Value::Null),
            ))
        })
    }

    fn create_cron_schedule<'a>(&'a self, options: StartOptions) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut client = self.client.clone();
            client
                .create_cron_schedule(pb::StartWorkflowRequest {
                    task_queue: options.task_queue,
                    workflow_id: options.workflow_id,
                    memo: Some(json_to_struct(&serde_json::to_value(&options.memo.0)?)),
                    cron_expression: options.cron_expression.unwrap_or_default(),
                    variant: String::new(),
                    input: None,
                })
                .await
                .map_err(map_status)?;
            Ok(())
        })
    }
}
