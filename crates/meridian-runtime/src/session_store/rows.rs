use std::collections::HashMap;

use chrono::{DateTime, Utc};
use meridian_core::error::Result;
use meridian_core::session::{Message, Session};
use uuid::Uuid;

#[derive(sqlx::FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub user_id: String,
    pub tenant_id: String,
    pub context: serde_json::Value,
    pub history: serde_json::Value,
    pub tokens_used: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SessionRow {
    pub fn into_domain(self) -> Result<Session> {
        let context: HashMap<String, serde_json::Value> =
            serde_json::from_value(self.context).unwrap_or_default();
        let history: Vec<Message> = serde_json::from_value(self.history).unwrap_or_default();
        Ok(Session {
            id: self.id,
            user_id: self.user_id,
            tenant_id: self.tenant_id,
            context,
            history,
            total_tokens_used: self.tokens_used,
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
            deleted_at: self.deleted_at,
        })
    }
}
