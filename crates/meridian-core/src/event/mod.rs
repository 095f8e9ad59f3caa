use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known event types. Other values pass through as free-form strings —
/// workflow activities are free to emit types this core doesn't special-case,
/// but the finalizer and streaming service key their behavior off these.
pub mod event_type {
    pub const LLM_PARTIAL: &str = "LLM_PARTIAL";
    pub const LLM_OUTPUT: &str = "LLM_OUTPUT";
    pub const AGENT_TOKEN_USAGE: &str = "AGENT_TOKEN_USAGE";
    pub const WORKFLOW_COMPLETED: &str = "WORKFLOW_COMPLETED";
    pub const REVIEW_USER_FEEDBACK: &str = "REVIEW_USER_FEEDBACK";
    pub const RESEARCH_PLAN_UPDATED: &str = "RESEARCH_PLAN_UPDATED";
}

/// An opaque, strictly-ordered cursor assigned by the append-only log to
/// each event. Clients pass it back verbatim to resume a stream; the core
/// never parses its internal structure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(pub String);

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single entry in a workflow's event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub workflow_id: String,
    pub event_type: String,
    pub agent_id: Option<String>,
    pub message: Option<String>,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    /// Strictly monotonically increasing per workflow, gapless (P4).
    pub seq: i64,
    /// Strictly ordered under the log's own order (independent of `seq`,
    /// since it is assigned by the backing log, not by the publisher).
    pub stream_id: StreamId,
}

impl EventRecord {
    pub fn is_completion(&self) -> bool {
        self.event_type == event_type::WORKFLOW_COMPLETED
    }

    /// Whether this event should be persisted to the durable fallback log.
    /// `LLM_PARTIAL` deltas are excluded: they are superseded by the
    /// terminal `LLM_OUTPUT`/`WORKFLOW_COMPLETED` event for the same
    /// logical output, so persisting them durably buys no replay value.
    /// See SPEC_FULL.md Open Question (a).
    pub fn is_durable(&self) -> bool {
        self.event_type != event_type::LLM_PARTIAL
    }
}

/// A set of event types a streaming subscriber wants to receive. `None`
/// means no filtering.
#[derive(Debug, Clone, Default)]
pub struct TypeFilter(Option<Vec<String>>);

impl TypeFilter {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn of(types: Vec<String>) -> Self {
        if types.is_empty() {
            Self(None)
        } else {
            Self(Some(types))
        }
    }

    pub fn allows(&self, event_type: &str) -> bool {
        match &self.0 {
            None => true,
            Some(types) => types.iter().any(|t| t == event_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(event_type: &str, seq: i64) -> EventRecord {
        EventRecord {
            workflow_id: "wf-1".into(),
            event_type: event_type.into(),
            agent_id: None,
            message: None,
            payload: serde_json::json!({}),
            timestamp: Utc::now(),
            seq,
            stream_id: StreamId(format!("{seq}-0")),
        }
    }

    #[test]
    fn llm_partial_is_not_durable() {
        assert!(!sample(event_type::LLM_PARTIAL, 1).is_durable());
        assert!(sample(event_type::LLM_OUTPUT, 2).is_durable());
    }

    #[test]
    fn type_filter_empty_allows_all() {
        let f = TypeFilter::none();
        assert!(f.allows(event_type::LLM_OUTPUT));
    }

    #[test]
    fn type_filter_restricts() {
        let f = TypeFilter::of(vec![event_type::WORKFLOW_COMPLETED.to_string()]);
        assert!(f.allows(event_type::WORKFLOW_COMPLETED));
        assert!(!f.allows(event_type::LLM_OUTPUT));
    }

    #[test]
    fn completion_detection() {
        assert!(sample(event_type::WORKFLOW_COMPLETED, 3).is_completion());
        assert!(!sample(event_type::LLM_OUTPUT, 3).is_completion());
    }
}
