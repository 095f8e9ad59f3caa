//! Raw Redis stream access for the event log. Key layout per SPEC_FULL.md
//! §6: `shannon:workflow:events:<workflow_id>` (the entries) and
//! `shannon:workflow:events:<workflow_id>:seq` (the monotonic counter).

use meridian_core::error::{CoreError, Result};
use meridian_core::event::{EventRecord, StreamId};
use redis::AsyncCommands;

fn log_key(workflow_id: &str) -> String {
    format!("shannon:workflow:events:{workflow_id}")
}

fn seq_key(workflow_id: &str) -> String {
    format!("shannon:workflow:events:{workflow_id}:seq")
}

pub async fn next_seq(conn: &mut redis::aio::ConnectionManager, workflow_id: &str) -> Result<i64> {
    conn.incr(seq_key(workflow_id), 1)
        .await
        .map_err(|e| CoreError::Unavailable(format!("event log seq increment failed: {e}")))
}

/// Appends `event` (already seq-assigned) to the stream, trimmed to an
/// approximate maxlen (`~`) so the trim itself stays cheap. Returns the
/// stream-assigned entry id.
pub async fn append(
    conn: &mut redis::aio::ConnectionManager,
    event: &EventRecord,
    maxlen: usize,
) -> Result<String> {
    let payload = serde_json::to_string(&event.payload)
        .map_err(|e| CoreError::Internal(format!("event payload encode failed: {e}")))?;

    let items: Vec<(&str, String)> = vec![
        ("event_type", event.event_type.clone()),
        ("agent_id", event.agent_id.clone().unwrap_or_default()),
        ("message", event.message.clone().unwrap_or_default()),
        ("payload", payload),
        ("timestamp", event.timestamp.to_rfc3339()),
        ("seq", event.seq.to_string()),
    ];

    let id: String = conn
        .xadd_maxlen(
            log_key(&event.workflow_id),
            redis::streams::StreamMaxlen::Approx(maxlen),
            "*",
            &items,
        )
        .await
        .map_err(|e| CoreError::Unavailable(format!("event log append failed: {e}")))?;
    Ok(id)
}

/// Reads entries in `(start, end]`-ish Redis range syntax (`-`/`+`/
/// `(id`/exact id are all valid per XRANGE semantics) and decodes them
/// back into [`EventRecord`]s, skipping any entry this node doesn't
/// recognize rather than failing the whole replay.
pub async fn range(
    conn: &mut redis::aio::ConnectionManager,
    workflow_id: &str,
    start: &str,
    end: &str,
) -> Result<Vec<EventRecord>> {
    let entries: Vec<(String, std::collections::HashMap<String, String>)> = conn
        .xrange(log_key(workflow_id), start, end)
        .await
        .map_err(|e| CoreError::Unavailable(format!("event log range read failed: {e}")))?;

    let mut out = Vec::with_capacity(entries.len());
    for (id, fields) in entries {
        if let Some(record) = decode(workflow_id, &id, &fields) {
            out.push(record);
        }
    }
    Ok(out)
}

fn decode(
    workflow_id: &str,
    stream_id: &str,
    fields: &std::collections::HashMap<String, String>,
) -> Option<EventRecord> {
    let event_type = fields.get("event_type")?.clone();
    let seq: i64 = fields.get("seq")?.parse().ok()?;
    let timestamp = fields
        .get("timestamp")
        .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&chrono::Utc))
        .unwrap_or_else(chrono::Utc::now);
    let payload = fields
        .get("payload")
        .and_then(|p| serde_json::from_str(p).ok())
        .unwrap_or(serde_json::Value::Null);
    let agent_id = fields.get("agent_id").filter(|s| !s.is_empty()).cloned();
    let message = fields.get("message").filter(|s| !s.is_empty()).cloned();

    Some(EventRecord {
        workflow_id: workflow_id.to_string(),
        event_type,
        agent_id,
        message,
        payload,
        timestamp,
        seq,
        stream_id: StreamId(stream_id.to_string()),
    })
}
