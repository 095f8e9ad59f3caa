use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use meridian_core::cluster::{LeaderRole, NodeInfo, NodeRole};
use meridian_core::router::RouterPolicy;
use meridian_runtime::cluster::{Heartbeat, LeaderElection, NodeRegistry};
use meridian_runtime::control::ControlPlaneService;
use meridian_runtime::engine_client::{GrpcEngineClient, HttpReviewLlmClient};
use meridian_runtime::gateway::{self, GatewayServices};
use meridian_runtime::review::{ReviewCoordinator, ReviewStore};
use meridian_runtime::session_store::SessionStore;
use meridian_runtime::submission::SubmissionService;
use meridian_runtime::{db, observability, EventBus, Finalizer, Ledger, StreamingService};

/// Run the orchestration and streaming gRPC servers.
#[derive(Parser)]
pub struct ServeCommand {
    /// Configuration file path.
    #[arg(short, long, default_value = "meridian.toml")]
    pub config: String,
}

impl ServeCommand {
    pub async fn execute(self) -> Result<()> {
        let config = meridian_runtime::config::load_from_file(&self.config)
            .with_context(|| format!("loading config from {}", self.config))?;

        observability::init_tracing(&config.observability);

        let pool = db::create_pool(&config.database)
            .await
            .context("connecting to database")?;

        let redis_client = redis::Client::open(config.cluster.redis_addr.as_str())
            .context("invalid REDIS_ADDR")?;
        let redis = redis_client
            .get_connection_manager()
            .await
            .context("connecting to redis")?;

        let sessions = SessionStore::new(pool.clone(), redis.clone());
        let ledger = Ledger::new(pool.clone());

        let bus = Arc::new(
            EventBus::connect(&config.cluster.redis_addr)
                .await
                .context("connecting event bus")?,
        );

        let engine: Arc<dyn meridian_core::engine::EngineClient> = Arc::new(
            GrpcEngineClient::connect(&config.engine.addr, Duration::from_secs(config.engine.request_timeout_secs))
                .await
                .context("connecting to workflow engine")?,
        );

        let router = RouterPolicy::new(config.router.priority_queues_enabled);
        let finalizer = Finalizer::new(ledger.clone(), engine.clone());

        let submissions = Arc::new(SubmissionService::new(
            sessions.clone(),
            ledger.clone(),
            bus.clone(),
            engine.clone(),
            router,
            finalizer.clone(),
        ));
        let control = Arc::new(ControlPlaneService::new(engine.clone()));

        let review_llm: Arc<dyn meridian_core::review::ReviewLlmClient> = Arc::new(
            HttpReviewLlmClient::new(
                config.review_llm.base_url.clone(),
                Duration::from_secs(config.review_llm.request_timeout_secs),
            )
            .context("constructing review LLM client")?,
        );
        let review = Arc::new(ReviewCoordinator::new(
            ReviewStore::new(redis.clone()),
            review_llm,
            bus.clone(),
            engine.clone(),
            ledger.clone(),
        ));

        let streaming = Arc::new(StreamingService::new(bus.clone(), engine.clone()));

        let node = NodeInfo::new(
            hostname().unwrap_or_else(|| "unknown".to_string()),
            NodeRole::from_str(&config.cluster.node_role).unwrap_or(NodeRole::All),
        );
        let registry = NodeRegistry::new(pool.clone());
        registry.register(&node).await.context("registering node")?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        tokio::spawn(Heartbeat::new(
            registry,
            node.id,
            Duration::from_secs(config.cluster.heartbeat_interval_secs),
        )
        .run(shutdown_rx));

        if node.role.serves_background_work() {
            let leader = LeaderElection::new(pool.clone(), LeaderRole::FinalizerSweep);
            let sweep_ledger = ledger.clone();
            let sweep_finalizer = finalizer.clone();
            tokio::spawn(async move {
                leader
                    .run_while_leader(Duration::from_secs(60), || {
                        let sweep_ledger = sweep_ledger.clone();
                        let sweep_finalizer = sweep_finalizer.clone();
                        async move {
                            match sweep_ledger.list_open_workflow_ids().await {
                                Ok(ids) if !ids.is_empty() => {
                                    tracing::info!(count = ids.len(), "relaunching finalizers for open tasks");
                                    sweep_finalizer.relaunch_open_tasks(ids).await;
                                }
                                Ok(_) => {}
                                Err(e) => tracing::warn!(error = %e, "failed to list open workflow ids"),
                            }
                        }
                    })
                    .await;
            });
        }

        tracing::info!(
            grpc = %config.server.grpc_bind_addr,
            streaming = %config.server.streaming_bind_addr,
            node_id = %node.id,
            "meridian starting"
        );

        let result = gateway::serve(
            &config.server,
            GatewayServices {
                submissions,
                control,
                review,
                sessions,
                ledger,
                engine,
                streaming,
            },
        )
        .await;

        let _ = shutdown_tx.send(true);
        result.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

fn hostname() -> Option<String> {
    std::env::var("HOSTNAME").ok()
}
