//! Concrete, runnable implementation of the components defined in
//! `meridian-core`: Postgres/`sqlx` persistence for the Task Ledger and
//! Session Store, a Redis-backed Event Bus, a `tonic` client for the
//! Workflow-Engine Client Facade, the gRPC server surface the orchestration
//! and streaming services expose, and the ambient process wiring (config
//! loading, migrations, multi-instance coordination, structured logging)
//! that turns C1–C10 into a runnable service.

pub mod cluster;
pub mod config;
pub mod control;
pub mod db;
pub mod engine_client;
pub mod event_bus;
pub mod finalizer;
pub mod gateway;
pub mod ledger;
pub mod migrations;
pub mod observability;
pub mod pb;
pub mod pb_json;
pub mod review;
pub mod session_store;
pub mod streaming;
pub mod submission;

pub use engine_client::GrpcEngineClient;
pub use event_bus::EventBus;
pub use finalizer::Finalizer;
pub use ledger::Ledger;
pub use review::ReviewCoordinator;
pub use session_store::SessionStore;
pub use streaming::StreamingService;
pub use submission::SubmissionService;
