//! Config loading: TOML file + `${VAR}` environment substitution, then an
//! environment-variable overlay for the variables named in SPEC_FULL.md §6.
//! The only place in the workspace that touches a filesystem or
//! `std::env` for configuration purposes; everywhere else takes a
//! [`meridian_core::config::AppConfig`] by value.

use meridian_core::config::AppConfig;
use meridian_core::error::{CoreError, Result};
use std::path::Path;

/// Loads config from a TOML file, substituting `${VAR}` references first.
/// An empty/missing file is valid (all-defaults); a `${VAR}` reference to
/// an unset environment variable is a [`CoreError::Config`], never a panic.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<AppConfig> {
    let content = match std::fs::read_to_string(path.as_ref()) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(CoreError::Config(format!("failed to read config file: {e}"))),
    };
    let mut config = parse_toml(&content)?;
    apply_env_overlay(&mut config);
    Ok(config)
}

/// Parses a TOML string into [`AppConfig`], substituting `${VAR}`
/// references against the process environment.
pub fn parse_toml(content: &str) -> Result<AppConfig> {
    let substituted = substitute_env_vars(content)?;
    toml::from_str(&substituted).map_err(|e| CoreError::Config(format!("invalid config: {e}")))
}

fn substitute_env_vars(content: &str) -> Result<String> {
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
    let mut result = String::with_capacity(content.len());
    let mut last_end = 0;
    for cap in re.captures_iter(content) {
        let whole = cap.get(0).unwrap();
        let var_name = &cap[1];
        let value = std::env::var(var_name).map_err(|_| {
            CoreError::Config(format!("config references unset environment variable: {var_name}"))
        })?;
        result.push_str(&content[last_end..whole.start()]);
        result.push_str(&value);
        last_end = whole.end();
    }
    result.push_str(&content[last_end..]);
    Ok(result)
}

/// Overlays the explicit environment variables named in SPEC_FULL.md §6 on
/// top of whatever the TOML file resolved to, so `HISTORY_WINDOW_MESSAGES=80
/// meridian serve` works with zero config file.
fn apply_env_overlay(config: &mut AppConfig) {
    if let Some(v) = env_usize("HISTORY_WINDOW_MESSAGES") {
        config.history.window_messages = v;
    }
    if let Some(v) = env_usize("HISTORY_WINDOW_DEBUG_MESSAGES") {
        config.history.window_debug_messages = v;
    }
    if let Some(v) = env_f64("COMPRESSION_TRIGGER_RATIO") {
        config.history.compression_trigger_ratio = v;
    }
    if let Some(v) = env_f64("COMPRESSION_TARGET_RATIO") {
        config.history.compression_target_ratio = v;
    }
    if let Some(v) = env_bool("PRIORITY_QUEUES") {
        config.router.priority_queues_enabled = v;
    }
    if let Ok(v) = std::env::var("REDIS_ADDR") {
        config.cluster.redis_addr = v;
    }
    if let Some(v) = env_bool("GATEWAY_SKIP_AUTH") {
        config.auth_env.gateway_skip_auth = v;
    }
    if let Ok(v) = std::env::var("ENVIRONMENT") {
        config.auth_env.environment = v;
    }
    if let Ok(v) = std::env::var("DATABASE_URL") {
        config.database.url = v;
    }
    if let Some(v) = env_u32("DATABASE_POOL_SIZE") {
        config.database.pool_size = v;
    }
    if let Ok(v) = std::env::var("GRPC_BIND_ADDR") {
        config.server.grpc_bind_addr = v;
    }
    if let Ok(v) = std::env::var("STREAMING_BIND_ADDR") {
        config.server.streaming_bind_addr = v;
    }
    if let Ok(v) = std::env::var("RUST_LOG") {
        config.observability.rust_log = v;
    }
    if let Ok(v) = std::env::var("NODE_ROLE") {
        config.cluster.node_role = v;
    }
    if let Ok(v) = std::env::var("ENGINE_ADDR") {
        config.engine.addr = v;
    }
    if let Ok(v) = std::env::var("REVIEW_LLM_URL") {
        config.review_llm.base_url = v;
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn empty_content_resolves_to_defaults() {
        let config = parse_toml("").unwrap();
        assert_eq!(config.server.grpc_bind_addr, "0.0.0.0:50051");
    }

    #[test]
    fn substitutes_set_env_var() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("MERIDIAN_TEST_REDIS_ADDR", "redis://cache:6379");
        let config = parse_toml(
            r#"
            [cluster]
            redis_addr = "${MERIDIAN_TEST_REDIS_ADDR}"
            "#,
        )
        .unwrap();
        assert_eq!(config.cluster.redis_addr, "redis://cache:6379");
        std::env::remove_var("MERIDIAN_TEST_REDIS_ADDR");
    }

    #[test]
    fn unset_env_var_fails_without_panicking() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("MERIDIAN_TEST_DOES_NOT_EXIST");
        let err = parse_toml(
            r#"
            [cluster]
            redis_addr = "${MERIDIAN_TEST_DOES_NOT_EXIST}"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn env_overlay_applies_on_top_of_file() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("MERIDIAN_TEST_PRIORITY_QUEUES", "1");
        std::env::set_var("PRIORITY_QUEUES", "true");
        let mut config = parse_toml("").unwrap();
        apply_env_overlay(&mut config);
        assert!(config.router.priority_queues_enabled);
        std::env::remove_var("PRIORITY_QUEUES");
        std::env::remove_var("MERIDIAN_TEST_PRIORITY_QUEUES");
    }
}
