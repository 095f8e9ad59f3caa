//! The `StreamingService` gRPC surface: enforces tenant/owner isolation at
//! the boundary (C8 itself is pure event-log plumbing with no notion of a
//! caller) before handing off to the Streaming Service, and maps each
//! `EventRecord` or mid-stream error onto a wire `TaskUpdate`.

use std::pin::Pin;
use std::sync::Arc;

use meridian_core::engine::EngineClient;
use meridian_core::event::TypeFilter;
use meridian_core::tenant::{enforce_owner, enforce_tenant, CallerContext};
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status};

use crate::pb::streaming as pb;
use crate::streaming::{StreamRequest, StreamingService as CoreStreamingService};

use super::error::to_status;

pub struct StreamingGateway {
    engine: Arc<dyn EngineClient>,
    service: Arc<CoreStreamingService>,
}

impl StreamingGateway {
    pub fn new(engine: Arc<dyn EngineClient>, service: Arc<CoreStreamingService>) -> Self {
        Self { engine, service }
    }
}

#[tonic::async_trait]
impl pb::streaming_service_server::StreamingService for StreamingGateway {
    type StreamTaskExecutionStream = Pin<Box<dyn Stream<Item = Result<pb::TaskUpdate, Status>> + Send + 'static>>;

    async fn stream_task_execution(
        &self,
        request: Request<pb::StreamTaskExecutionRequest>,
    ) -> Result<Response<Self::StreamTaskExecutionStream>, Status> {
        let req = request.into_inner();
        let caller = if req.user_id.is_empty() {
            CallerContext::anonymous()
        } else {
            CallerContext::new(req.user_id.clone(), req.tenant_id.clone())
        };
        caller.require_authenticated().map_err(to_status)?;

        let describe = self.engine.describe(&req.workflow_id).await.map_err(to_status)?;
        enforce_tenant(&caller, describe.memo.tenant_id().unwrap_or_default(), "task").map_err(to_status)?;
        enforce_owner(&caller, describe.memo.user_id(), "task").map_err(to_status)?;

        let inner = self
            .service
            .stream(StreamRequest {
                workflow_id: req.workflow_id,
                types_filter: TypeFilter::of(req.types),
                last_stream_id: (!req.last_stream_id.is_empty()).then_some(req.last_stream_id),
                last_event_seq: (req.last_event_seq > 0).then_some(req.last_event_seq),
            })
            .await
            .map_err(to_status)?;

        let mapped = inner.map(|item| {
            item.map(|event| pb::TaskUpdate {
                workflow_id: event.workflow_id,
                r#type: event.event_type,
                agent_id: event.agent_id.unwrap_or_default(),
                message: event.message.unwrap_or_default(),
                payload_json: event.payload.to_string(),
                timestamp_ms: event.timestamp.timestamp_millis(),
                seq: event.seq,
                stream_id: event.stream_id.0,
            })
            .map_err(to_status)
        });

        Ok(Response::new(Box::pin(mapped) as Self::StreamTaskExecutionStream))
    }
}
