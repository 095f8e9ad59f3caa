//! Typed configuration shared across every component. Values here are the
//! defaults a minimal config file resolves to; `meridian-runtime`'s config
//! loader is the only place that touches a filesystem or environment
//! variable, overlaying onto [`AppConfig`] via `serde`.

pub mod database;

pub use database::DatabaseConfig;

use serde::{Deserialize, Serialize};

/// History window sizing and compression knobs consumed by the Session
/// Store (C3) and the Task Submission Service (C6) when building workflow
/// input. Mirrors `HISTORY_WINDOW_MESSAGES`, `HISTORY_WINDOW_DEBUG_MESSAGES`,
/// `COMPRESSION_TRIGGER_RATIO`, `COMPRESSION_TARGET_RATIO`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_window")]
    pub window_messages: usize,

    #[serde(default = "default_history_window_debug")]
    pub window_debug_messages: usize,

    /// Primer count: how many of the oldest messages to always keep when
    /// compressing a long session, regardless of the recent window.
    #[serde(default = "default_primer_count")]
    pub primer_count: usize,

    /// Ratio of (tokens used / token budget) at which compression kicks in.
    #[serde(default = "default_compression_trigger_ratio")]
    pub compression_trigger_ratio: f64,

    /// Ratio of the budget compression should target after running.
    #[serde(default = "default_compression_target_ratio")]
    pub compression_target_ratio: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window_messages: default_history_window(),
            window_debug_messages: default_history_window_debug(),
            primer_count: default_primer_count(),
            compression_trigger_ratio: default_compression_trigger_ratio(),
            compression_target_ratio: default_compression_target_ratio(),
        }
    }
}

fn default_history_window() -> usize {
    crate::session::HISTORY_WINDOW_DEFAULT
}

fn default_history_window_debug() -> usize {
    crate::session::HISTORY_WINDOW_DEBUG_DEFAULT
}

fn default_primer_count() -> usize {
    5
}

fn default_compression_trigger_ratio() -> f64 {
    0.8
}

fn default_compression_target_ratio() -> f64 {
    0.5
}

/// Feature flags consulted by the Router Policy (C5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub priority_queues_enabled: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            priority_queues_enabled: false,
        }
    }
}

/// Network binds for the orchestration and streaming gRPC services. They
/// are independently configurable so the streaming service can be scaled
/// or rate-limited separately from the orchestration service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_grpc_bind")]
    pub grpc_bind_addr: String,

    #[serde(default = "default_streaming_bind")]
    pub streaming_bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_bind_addr: default_grpc_bind(),
            streaming_bind_addr: default_streaming_bind(),
        }
    }
}

fn default_grpc_bind() -> String {
    "0.0.0.0:50051".to_string()
}

fn default_streaming_bind() -> String {
    "0.0.0.0:50052".to_string()
}

/// Multi-instance coordination: which role this process serves and the
/// Redis address backing the Event Bus (C1) and the Session Store's
/// write-through cache (C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_node_role")]
    pub node_role: String,

    #[serde(default = "default_redis_addr")]
    pub redis_addr: String,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    #[serde(default = "default_node_stale_after")]
    pub node_stale_after_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_role: default_node_role(),
            redis_addr: default_redis_addr(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            node_stale_after_secs: default_node_stale_after(),
        }
    }
}

fn default_node_role() -> String {
    "all".to_string()
}

fn default_redis_addr() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_heartbeat_interval() -> u64 {
    15
}

fn default_node_stale_after() -> u64 {
    60
}

/// Auth-related environment consumed by the (external) gateway auth
/// middleware collaborator, forwarded through so a single config file
/// drives the whole process. The core itself never checks `skip_auth`;
/// it only authenticates via the [`crate::tenant::CallerContext`] it is
/// handed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthEnvConfig {
    #[serde(default)]
    pub gateway_skip_auth: bool,

    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for AuthEnvConfig {
    fn default() -> Self {
        Self {
            gateway_skip_auth: false,
            environment: default_environment(),
        }
    }
}

fn default_environment() -> String {
    "development".to_string()
}

/// Structured logging configuration: `tracing-subscriber`'s `EnvFilter`
/// directive plus whether to emit JSON (production) or pretty (local) logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_rust_log")]
    pub rust_log: String,

    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            rust_log: default_rust_log(),
            json_logs: false,
        }
    }
}

fn default_rust_log() -> String {
    "info,meridian=debug".to_string()
}

/// Connection details for the two out-of-scope collaborators C4 and the
/// review LLM client talk to. Not named in SPEC_FULL.md §6's environment
/// list (which covers the core's own knobs); these are the ambient plumbing
/// a concrete, runnable process needs to reach them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_addr")]
    pub addr: String,

    #[serde(default = "default_engine_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            addr: default_engine_addr(),
            request_timeout_secs: default_engine_timeout_secs(),
        }
    }
}

fn default_engine_addr() -> String {
    "http://127.0.0.1:7070".to_string()
}

fn default_engine_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewLlmConfig {
    #[serde(default = "default_review_llm_url")]
    pub base_url: String,

    #[serde(default = "default_review_llm_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ReviewLlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_review_llm_url(),
            request_timeout_secs: default_review_llm_timeout_secs(),
        }
    }
}

fn default_review_llm_url() -> String {
    "http://127.0.0.1:8090".to_string()
}

fn default_review_llm_timeout_secs() -> u64 {
    30
}

/// The top-level, `serde`-derived configuration for a core instance. A
/// minimal config file (or none at all) is valid: every field has a
/// default, per SPEC_FULL.md's ambient-stack requirement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub auth_env: AuthEnvConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub review_llm: ReviewLlmConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_resolves_to_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.history.window_messages, crate::session::HISTORY_WINDOW_DEFAULT);
        assert_eq!(cfg.server.grpc_bind_addr, "0.0.0.0:50051");
        assert!(!cfg.router.priority_queues_enabled);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [router]
            priority_queues_enabled = true
            "#,
        )
        .unwrap();
        assert!(cfg.router.priority_queues_enabled);
        assert_eq!(cfg.cluster.redis_addr, "redis://127.0.0.1:6379");
    }
}
