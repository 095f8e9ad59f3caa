//! C8: the Streaming Service. Replays C1's append-only log from whichever
//! resume point the caller supplies, then continues live, applying a type
//! filter on send and validating workflow existence against C4 if the live
//! side goes quiet for too long (§4.8).

use std::time::Duration;

use meridian_core::error::{CoreError, Result};
use meridian_core::engine::EngineClient;
use meridian_core::event::{event_type, EventRecord, StreamId, TypeFilter};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::event_bus::EventBus;

const FIRST_EVENT_TIMEOUT: Duration = Duration::from_secs(30);
const CHANNEL_CAPACITY: usize = 64;
const LOG_BEGINNING: &str = "0-0";

pub struct StreamRequest {
    pub workflow_id: String,
    pub types_filter: TypeFilter,
    pub last_stream_id: Option<String>,
    pub last_event_seq: Option<i64>,
}

pub struct StreamingService {
    bus: Arc<EventBus>,
    engine: Arc<dyn EngineClient>,
}

impl StreamingService {
    pub fn new(bus: Arc<EventBus>, engine: Arc<dyn EngineClient>) -> Self {
        Self { bus, engine }
    }

    /// Spawns a detached task driving the stream and returns its receiving
    /// half as a `Stream`. Dropping the returned stream drops the channel's
    /// receiver, which the driver task observes as a closed `tx` on its next
    /// send and uses to stop promptly (client cancellation, §4.8 closing
    /// note).
    pub async fn stream(&self, req: StreamRequest) -> Result<ReceiverStream<Result<EventRecord>>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let backlog = self.initial_backlog(&req).await?;
        let seen_during_replay = !backlog.is_empty();
        let resume_specified = req.last_stream_id.is_some() || req.last_event_seq.is_some();

        let live_cursor = if let Some(last) = backlog.last() {
            last.stream_id.clone()
        } else if resume_specified {
            StreamId(LOG_BEGINNING.to_string())
        } else {
            // No resume point and nothing replayed: live only, start at `$`.
            StreamId(String::new())
        };

        let subscription = if live_cursor.0.is_empty() && !resume_specified && !seen_during_replay {
            self.bus.subscribe(&req.workflow_id)
        } else {
            self.bus.subscribe_from(&req.workflow_id, &live_cursor).await?
        };

        let engine = Arc::clone(&self.engine);
        let workflow_id = req.workflow_id.clone();
        let types_filter = req.types_filter;

        tokio::spawn(async move {
            let mut subscription = subscription;

            for event in backlog {
                if !send_filtered(&tx, &types_filter, event.clone()).await {
                    return;
                }
                if event.event_type == event_type::WORKFLOW_COMPLETED {
                    return;
                }
            }

            loop {
                match tokio::time::timeout(FIRST_EVENT_TIMEOUT, subscription.next()).await {
                    Ok(Some(crate::event_bus::SubscriptionItem::Event(event))) => {
                        let completed = event.event_type == event_type::WORKFLOW_COMPLETED;
                        if !send_filtered(&tx, &types_filter, event).await {
                            return;
                        }
                        if completed {
                            return;
                        }
                    }
                    Ok(Some(crate::event_bus::SubscriptionItem::Lagged(_))) => {
                        // A lagging broadcast receiver has no authoritative
                        // recovery here; the client is expected to resume
                        // with a fresh cursor if this manifests as a gap.
                        continue;
                    }
                    Ok(None) => return,
                    Err(_elapsed) => {
                        // Not-found or any other describe failure both mean
                        // the workflow can't be confirmed to exist; either
                        // way we terminate (§4.8 step 5).
                        match engine.describe(&workflow_id).await {
                            Ok(_) => continue,
                            Err(_) => {
                                let _ = tx.send(Err(CoreError::not_found("workflow"))).await;
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    async fn initial_backlog(&self, req: &StreamRequest) -> Result<Vec<EventRecord>> {
        if let Some(cursor) = &req.last_stream_id {
            self.bus
                .replay_from_stream_id(&req.workflow_id, &StreamId(cursor.clone()))
                .await
        } else if let Some(seq) = req.last_event_seq {
            if seq > 0 {
                self.bus.replay_since(&req.workflow_id, seq).await
            } else {
                Ok(Vec::new())
            }
        } else {
            Ok(Vec::new())
        }
    }
}

/// Forwards `event` to `tx` unless `filter` excludes its type. Returns
/// `false` when the receiver has gone away (client cancellation) so the
/// caller can stop the driver loop.
async fn send_filtered(
    tx: &mpsc::Sender<Result<EventRecord>>,
    filter: &TypeFilter,
    event: EventRecord,
) -> bool {
    if !filter.allows(&event.event_type) {
        return true;
    }
    tx.send(Ok(event)).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_event_timeout_is_thirty_seconds() {
        assert_eq!(FIRST_EVENT_TIMEOUT, Duration::from_secs(30));
    }
}
