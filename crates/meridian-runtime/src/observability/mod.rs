//! Structured logging init. A JSON-formatted layer for production, a
//! human-readable layer otherwise, both driven by an `EnvFilter` built from
//! `RUST_LOG` (with [`meridian_core::config::ObservabilityConfig::rust_log`]
//! as the fallback when the environment variable is unset).

use meridian_core::config::ObservabilityConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global tracing subscriber. Call once at process startup,
/// before any other component logs.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.rust_log));

    if config.json_logs {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}
