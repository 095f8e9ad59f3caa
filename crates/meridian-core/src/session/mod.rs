use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Role of a message within a session history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// A single turn in a session's conversation history. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The default, floor, and ceiling window sizes for [`Session::recent_history`],
/// configurable via typed configuration and environment (`HISTORY_WINDOW_MESSAGES`,
/// `HISTORY_WINDOW_DEBUG_MESSAGES`).
pub const HISTORY_WINDOW_MIN: usize = 5;
pub const HISTORY_WINDOW_MAX: usize = 200;
pub const HISTORY_WINDOW_DEFAULT: usize = 50;
pub const HISTORY_WINDOW_DEBUG_DEFAULT: usize = 75;

/// Clamp a requested history window into `[HISTORY_WINDOW_MIN, HISTORY_WINDOW_MAX]`.
pub fn clamp_history_window(n: usize) -> usize {
    n.clamp(HISTORY_WINDOW_MIN, HISTORY_WINDOW_MAX)
}

/// A per-user conversational session, dual-addressable by its canonical UUID
/// or an external alias stored in `context["external_id"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: String,
    pub tenant_id: String,
    pub context: HashMap<String, serde_json::Value>,
    pub history: Vec<Message>,
    pub total_tokens_used: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, tenant_id: impl Into<String>, ttl: Duration) -> Self {
        Self::with_id(Uuid::new_v4(), user_id, tenant_id, ttl)
    }

    pub fn with_id(
        id: Uuid,
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            context: HashMap::new(),
            history: Vec::new(),
            total_tokens_used: 0,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
            deleted_at: None,
        }
    }

    pub fn external_id(&self) -> Option<&str> {
        self.context.get("external_id").and_then(|v| v.as_str())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Matches either the canonical UUID or the external alias, per the
    /// dual-identifier rule. Never matches a soft-deleted session.
    pub fn matches(&self, id_or_alias: &str) -> bool {
        if self.is_deleted() {
            return false;
        }
        self.id.to_string() == id_or_alias || self.external_id() == Some(id_or_alias)
    }

    /// Appends a message and bumps `updated_at`. Messages are append-only.
    pub fn append_message(&mut self, msg: Message) {
        self.history.push(msg);
        self.updated_at = Utc::now();
    }

    /// Merges new context entries over existing ones.
    pub fn merge_context(&mut self, patch: HashMap<String, serde_json::Value>) {
        self.context.extend(patch);
        self.updated_at = Utc::now();
    }

    pub fn extend_ttl(&mut self, by: Duration) {
        self.expires_at += by;
        self.updated_at = Utc::now();
    }

    /// Idempotent: returns `Ok(())` whether or not the session was already
    /// deleted.
    pub fn soft_delete(&mut self) {
        if self.deleted_at.is_none() {
            self.deleted_at = Some(Utc::now());
        }
    }

    /// Ownership check used by every mutating call. A mismatch yields
    /// `NotFound`, never a leaking "forbidden".
    pub fn check_owner(&self, user_id: &str) -> Result<()> {
        if self.user_id != user_id {
            return Err(CoreError::not_found("session"));
        }
        Ok(())
    }

    /// Last `n` messages in insertion order, `n` clamped to the configured
    /// window.
    pub fn recent_history(&self, n: usize) -> &[Message] {
        let n = clamp_history_window(n);
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Session {
        Session::new("u1", "t1", Duration::hours(1))
    }

    #[test]
    fn expires_after_created() {
        let s = sample();
        assert!(s.expires_at > s.created_at);
    }

    #[test]
    fn dual_identifier_resolution() {
        let mut s = sample();
        s.context
            .insert("external_id".into(), serde_json::json!("alias-1"));
        assert!(s.matches(&s.id.to_string()));
        assert!(s.matches("alias-1"));
        assert!(!s.matches("unrelated"));
    }

    #[test]
    fn soft_delete_hides_from_matches() {
        let mut s = sample();
        s.soft_delete();
        assert!(!s.matches(&s.id.to_string()));
    }

    #[test]
    fn soft_delete_is_idempotent() {
        let mut s = sample();
        s.soft_delete();
        let first = s.deleted_at;
        s.soft_delete();
        assert_eq!(first, s.deleted_at);
    }

    #[test]
    fn history_window_clamps() {
        assert_eq!(clamp_history_window(0), HISTORY_WINDOW_MIN);
        assert_eq!(clamp_history_window(10_000), HISTORY_WINDOW_MAX);
        assert_eq!(clamp_history_window(50), 50);
    }

    #[test]
    fn recent_history_returns_last_n_in_order() {
        let mut s = sample();
        for i in 0..10 {
            s.append_message(Message::new(MessageRole::User, format!("msg-{i}")));
        }
        let recent = s.recent_history(5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].content, "msg-5");
        assert_eq!(recent[4].content, "msg-9");
    }

    #[test]
    fn owner_check_rejects_mismatch() {
        let s = sample();
        assert!(s.check_owner("u1").is_ok());
        assert!(matches!(
            s.check_owner("someone-else"),
            Err(CoreError::NotFound(_))
        ));
    }
}
