//! Binds and serves the two gRPC endpoints SPEC_FULL.md's `ServerConfig`
//! names: the orchestration service and the streaming service, each on its
//! own address so the streaming endpoint can be scaled independently.

use std::sync::Arc;

use meridian_core::config::ServerConfig;
use meridian_core::engine::EngineClient;
use meridian_core::error::{CoreError, Result};
use tonic::transport::Server;

use crate::control::ControlPlaneService;
use crate::ledger::Ledger;
use crate::pb::orchestration::orchestration_service_server::OrchestrationServiceServer;
use crate::pb::streaming::streaming_service_server::StreamingServiceServer;
use crate::review::ReviewCoordinator;
use crate::session_store::SessionStore;
use crate::streaming::StreamingService as CoreStreamingService;
use crate::submission::SubmissionService;

use super::{OrchestrationGateway, StreamingGateway};

pub struct GatewayServices {
    pub submissions: Arc<SubmissionService>,
    pub control: Arc<ControlPlaneService>,
    pub review: Arc<ReviewCoordinator>,
    pub sessions: SessionStore,
    pub ledger: Ledger,
    pub engine: Arc<dyn EngineClient>,
    pub streaming: Arc<CoreStreamingService>,
}

/// Runs both gRPC servers concurrently until either exits (normally only on
/// error, since each binds a listener for the process lifetime).
pub async fn serve(config: &ServerConfig, services: GatewayServices) -> Result<()> {
    let orchestration = OrchestrationGateway::new(
        services.submissions,
        services.control,
        services.review,
        services.sessions,
        services.ledger,
    );
    let streaming = StreamingGateway::new(services.engine, services.streaming);

    let grpc_addr = config
        .grpc_bind_addr
        .parse()
        .map_err(|e| CoreError::Config(format!("invalid grpc_bind_addr: {e}")))?;
    let streaming_addr = config
        .streaming_bind_addr
        .parse()
        .map_err(|e| CoreError::Config(format!("invalid streaming_bind_addr: {e}")))?;

    let orchestration_server = Server::builder()
        .add_service(OrchestrationServiceServer::new(orchestration))
        .serve(grpc_addr);

    let streaming_server = Server::builder()
        .add_service(StreamingServiceServer::new(streaming))
        .serve(streaming_addr);

    tracing::info!(%grpc_addr, %streaming_addr, "gateway listening");

    tokio::try_join!(
        async { orchestration_server.await.map_err(|e| CoreError::Internal(format!("orchestration server: {e}"))) },
        async { streaming_server.await.map_err(|e| CoreError::Internal(format!("streaming server: {e}"))) },
    )?;
    Ok(())
}
