use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use cron::Schedule;

use crate::error::{CoreError, Result};
use crate::task::ModeLabel;

/// Tagged workflow variants, replacing any source-side runtime dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowVariant {
    Simple,
    Dag,
    Supervisor,
    Orchestrator,
}

/// Priority queue selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
}

impl Priority {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "normal" => Some(Self::Normal),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn queue_name(self) -> &'static str {
        match self {
            Self::Critical => "tasks-critical",
            Self::High => "tasks-high",
            Self::Normal => "tasks",
            Self::Low => "tasks-low",
        }
    }
}

/// The closed set of acceptable model providers. `provider_override` must
/// belong to this set.
pub const ALLOWED_PROVIDERS: &[&str] = &["openai", "anthropic", "google", "azure", "bedrock"];

/// Manual decomposition hint, when the caller explicitly requests a mode.
#[derive(Debug, Clone, Default)]
pub struct ManualDecomposition {
    pub mode: Option<String>,
}

/// Request shape the router consumes: label map plus optional hints.
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub labels: HashMap<String, String>,
    pub manual_decomposition: ManualDecomposition,
    pub disable_ai: bool,
    pub model_override: Option<String>,
    pub provider_override: Option<String>,
    pub model_tier: Option<String>,
}

/// The router's decision: variant + queue + mode + optional validated cron.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub variant: WorkflowVariant,
    pub queue: &'static str,
    pub mode: ModeLabel,
    pub cron_expression: Option<String>,
}

/// Pure decision logic for C5. Takes no I/O dependency; feature flags (e.g.
/// priority queues) are passed in explicitly so the policy stays testable
/// without a config object.
pub struct RouterPolicy {
    pub priority_queues_enabled: bool,
}

impl RouterPolicy {
    pub fn new(priority_queues_enabled: bool) -> Self {
        Self {
            priority_queues_enabled,
        }
    }

    pub fn route(&self, req: &RouteRequest) -> Result<RouteDecision> {
        self.validate_disable_ai_guardrails(req)?;
        if let Some(provider) = &req.provider_override {
            validate_provider(provider)?;
        }

        let queue = self.select_queue(req.labels.get("priority").map(String::as_str));
        let (variant, mode) = self.select_workflow(req);
        let cron_expression = match req.labels.get("cron_schedule") {
            Some(expr) => Some(validate_cron_expression(expr)?),
            None => None,
        };

        Ok(RouteDecision {
            variant,
            queue,
            mode,
            cron_expression,
        })
    }

    fn select_queue(&self, priority_label: Option<&str>) -> &'static str {
        if !self.priority_queues_enabled {
            if let Some(p) = priority_label {
                if p != "normal" {
                    tracing::debug!(priority = p, "priority queues disabled, label ignored");
                }
            }
            return "tasks";
        }
        match priority_label.and_then(Priority::parse) {
            Some(p) => p.queue_name(),
            None => {
                if let Some(p) = priority_label {
                    tracing::warn!(priority = p, "unknown priority label, defaulting to tasks");
                }
                "tasks"
            }
        }
    }

    fn select_workflow(&self, req: &RouteRequest) -> (WorkflowVariant, ModeLabel) {
        if let Some(explicit) = req.manual_decomposition.mode.as_deref() {
            if explicit == "complex" {
                return (WorkflowVariant::Orchestrator, ModeLabel::Complex);
            }
        }

        if let Some(workflow) = req.labels.get("workflow").map(String::as_str) {
            match workflow {
                "supervisor" => return (WorkflowVariant::Supervisor, ModeLabel::Supervisor),
                "dag" => return (WorkflowVariant::Dag, ModeLabel::Standard),
                "simple" => return (WorkflowVariant::Simple, ModeLabel::Simple),
                _ => {}
            }
        }

        if let Some(mode) = req.labels.get("mode").map(String::as_str) {
            match mode {
                "supervisor" => return (WorkflowVariant::Supervisor, ModeLabel::Supervisor),
                "simple" => return (WorkflowVariant::Simple, ModeLabel::Simple),
                "complex" => return (WorkflowVariant::Orchestrator, ModeLabel::Complex),
                "standard" => return (WorkflowVariant::Orchestrator, ModeLabel::Standard),
                _ => {}
            }
        }

        (WorkflowVariant::Orchestrator, ModeLabel::Standard)
    }

    fn validate_disable_ai_guardrails(&self, req: &RouteRequest) -> Result<()> {
        if !req.disable_ai {
            return Ok(());
        }
        if req.model_override.is_some() || req.provider_override.is_some() || req.model_tier.is_some() {
            return Err(CoreError::invalid(
                "disable_ai cannot be combined with model_override, provider_override, or model_tier",
            ));
        }
        Ok(())
    }
}

/// Parses `disable_ai` from a loosely-typed context value: real booleans,
/// case-insensitive boolean-like strings, and nonzero numerics all count.
pub fn parse_disable_ai(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => {
            matches!(s.to_ascii_lowercase().as_str(), "true" | "yes" | "1" | "on")
        }
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => false,
    }
}

fn validate_provider(provider: &str) -> Result<()> {
    if ALLOWED_PROVIDERS.contains(&provider) {
        Ok(())
    } else {
        Err(CoreError::invalid(format!("unknown provider: {provider}")))
    }
}

/// Validates a cron expression under a parser supporting 5-field
/// expressions and descriptors (`@hourly`, `@daily`, `@every <duration>`,
/// etc.), returning the normalized expression the engine facade's
/// `create_cron_schedule` should be given.
pub fn validate_cron_expression(expr: &str) -> Result<String> {
    let expr = expr.trim();

    if let Some(rest) = expr.strip_prefix("@every ") {
        humantime_duration(rest)
            .map_err(|_| CoreError::invalid(format!("invalid @every duration: {expr}")))?;
        return Ok(expr.to_string());
    }

    if let Some(normalized) = descriptor_to_five_field(expr) {
        return validate_five_or_six_field(&normalized).map(|_| expr.to_string());
    }

    validate_five_or_six_field(expr).map(|_| expr.to_string())
}

fn descriptor_to_five_field(expr: &str) -> Option<&'static str> {
    match expr {
        "@yearly" | "@annually" => Some("0 0 1 1 *"),
        "@monthly" => Some("0 0 1 * *"),
        "@weekly" => Some("0 0 * * 0"),
        "@daily" | "@midnight" => Some("0 0 * * *"),
        "@hourly" => Some("0 * * * *"),
        _ => None,
    }
}

fn validate_five_or_six_field(expr: &str) -> Result<()> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    let normalized = match parts.len() {
        5 => format!("0 {expr}"),
        6 => expr.to_string(),
        _ => return Err(CoreError::invalid(format!("invalid cron expression: {expr}"))),
    };
    Schedule::from_str(&normalized)
        .map(|_| ())
        .map_err(|e| CoreError::invalid(format!("invalid cron expression: {e}")))
}

/// Minimal duration parser for `@every <duration>`, supporting the `Ns`,
/// `Nm`, `Nh` suffixes the router needs; rejects anything else.
fn humantime_duration(s: &str) -> std::result::Result<Duration, ()> {
    let s = s.trim();
    let (num, suffix) = s.split_at(s.len().saturating_sub(1));
    let n: u64 = num.parse().map_err(|_| ())?;
    match suffix {
        "s" => Ok(Duration::from_secs(n)),
        "m" => Ok(Duration::from_secs(n * 60)),
        "h" => Ok(Duration::from_secs(n * 3600)),
        "d" => Ok(Duration::from_secs(n * 86400)),
        _ => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(labels: &[(&str, &str)]) -> RouteRequest {
        RouteRequest {
            labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn default_route_is_orchestrator_standard() {
        let policy = RouterPolicy::new(true);
        let decision = policy.route(&req(&[])).unwrap();
        assert_eq!(decision.variant, WorkflowVariant::Orchestrator);
        assert_eq!(decision.mode, ModeLabel::Standard);
        assert_eq!(decision.queue, "tasks");
    }

    #[test]
    fn priority_queue_selection() {
        let policy = RouterPolicy::new(true);
        let decision = policy.route(&req(&[("priority", "critical")])).unwrap();
        assert_eq!(decision.queue, "tasks-critical");
    }

    #[test]
    fn unknown_priority_defaults_to_tasks() {
        let policy = RouterPolicy::new(true);
        let decision = policy.route(&req(&[("priority", "urgent")])).unwrap();
        assert_eq!(decision.queue, "tasks");
    }

    #[test]
    fn priority_queues_disabled_routes_everything_to_tasks() {
        let policy = RouterPolicy::new(false);
        let decision = policy.route(&req(&[("priority", "critical")])).unwrap();
        assert_eq!(decision.queue, "tasks");
    }

    #[test]
    fn workflow_label_selects_variant() {
        let policy = RouterPolicy::new(true);
        let decision = policy.route(&req(&[("workflow", "simple")])).unwrap();
        assert_eq!(decision.variant, WorkflowVariant::Simple);
        assert_eq!(decision.mode, ModeLabel::Simple);
    }

    #[test]
    fn manual_decomposition_complex_forces_mode() {
        let policy = RouterPolicy::new(true);
        let mut r = req(&[]);
        r.manual_decomposition.mode = Some("complex".into());
        let decision = policy.route(&r).unwrap();
        assert_eq!(decision.mode, ModeLabel::Complex);
        assert_eq!(decision.variant, WorkflowVariant::Orchestrator);
    }

    #[test]
    fn invalid_cron_fails() {
        let policy = RouterPolicy::new(true);
        let err = policy
            .route(&req(&[("cron_schedule", "not a cron")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[test]
    fn every_descriptor_succeeds() {
        let policy = RouterPolicy::new(true);
        let decision = policy.route(&req(&[("cron_schedule", "@every 1h")])).unwrap();
        assert_eq!(decision.cron_expression.as_deref(), Some("@every 1h"));
    }

    #[test]
    fn five_field_cron_succeeds() {
        assert!(validate_cron_expression("*/5 * * * *").is_ok());
    }

    #[test]
    fn disable_ai_conflicts_with_model_override() {
        let policy = RouterPolicy::new(true);
        let mut r = req(&[]);
        r.disable_ai = true;
        r.model_override = Some("gpt-4".into());
        let err = policy.route(&r).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[test]
    fn disable_ai_alone_is_fine() {
        let policy = RouterPolicy::new(true);
        let mut r = req(&[]);
        r.disable_ai = true;
        assert!(policy.route(&r).is_ok());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let policy = RouterPolicy::new(true);
        let mut r = req(&[]);
        r.provider_override = Some("not-a-real-provider".into());
        let err = policy.route(&r).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[test]
    fn parse_disable_ai_accepts_variants() {
        assert!(parse_disable_ai(&serde_json::json!(true)));
        assert!(parse_disable_ai(&serde_json::json!("YES")));
        assert!(parse_disable_ai(&serde_json::json!(1)));
        assert!(!parse_disable_ai(&serde_json::json!(0)));
        assert!(!parse_disable_ai(&serde_json::json!("nah")));
    }
}
