//! Generated `tonic`/`prost` code for the three service contracts compiled
//! by `build.rs`. Kept as one module so `grpc::` and `engine_client::` share
//! a single include point.

pub mod orchestration {
    tonic::include_proto!("meridian.orchestration.v1");
}

pub mod streaming {
    tonic::include_proto!("meridian.streaming.v1");
}

pub mod engine {
    tonic::include_proto!("meridian.engine.v1");
}
