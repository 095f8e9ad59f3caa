//! gRPC boundary: `OrchestrationService` and `StreamingService` server
//! implementations over the components assembled in `meridian-core`/
//! `meridian-runtime`, plus the one `CoreError` → `tonic::Status` mapping
//! both share.

mod convert;
mod error;
mod orchestration;
mod server;
mod streaming;

pub use error::to_status;
pub use orchestration::OrchestrationGateway;
pub use server::{serve, GatewayServices};
pub use streaming::StreamingGateway;
