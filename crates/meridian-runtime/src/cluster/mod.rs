//! Multi-instance coordination: each core instance registers a
//! [`meridian_core::cluster::NodeInfo`] row and heartbeats it, and
//! leader-only housekeeping (the Terminal-State Finalizer's
//! relaunch-on-restart sweep) runs behind a Postgres-advisory-lock leader
//! election so it fires exactly once cluster-wide.

pub mod heartbeat;
pub mod leader;
pub mod registry;

pub use heartbeat::Heartbeat;
pub use leader::LeaderElection;
pub use registry::NodeRegistry;
