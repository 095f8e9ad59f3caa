use std::collections::VecDeque;

use meridian_core::event::EventRecord;
use tokio::sync::broadcast;

/// One item yielded by a [`Subscription`].
#[derive(Debug)]
pub enum SubscriptionItem {
    Event(EventRecord),
    /// The live channel lagged and dropped `skipped` events. The caller
    /// (C8) decides how to recover — typically a fresh `replay_since` call
    /// against the caller's own last-seen `seq`.
    Lagged(u64),
}

/// A live event subscription: an optional pre-buffered backlog (from a
/// replay) followed by the in-process broadcast channel, deduplicated by
/// `seq` across the boundary.
pub struct Subscription {
    backlog: VecDeque<EventRecord>,
    live: broadcast::Receiver<EventRecord>,
    last_seq: Option<i64>,
}

impl Subscription {
    pub(super) fn live(live: broadcast::Receiver<EventRecord>) -> Self {
        Self {
            backlog: VecDeque::new(),
            live,
            last_seq: None,
        }
    }

    pub(super) fn with_backlog(
        backlog: Vec<EventRecord>,
        live: broadcast::Receiver<EventRecord>,
        last_seq: Option<i64>,
    ) -> Self {
        Self {
            backlog: backlog.into(),
            live,
            last_seq,
        }
    }

    /// Awaits the next item. Returns `None` once the publisher side has
    /// been dropped entirely (no more events will ever arrive).
    pub async fn next(&mut self) -> Option<SubscriptionItem> {
        if let Some(event) = self.backlog.pop_front() {
            self.last_seq = Some(event.seq);
            return Some(SubscriptionItem::Event(event));
        }

        loop {
            match self.live.recv().await {
                Ok(event) => {
                    if let Some(last) = self.last_seq {
                        if event.seq <= last {
                            continue;
                        }
                    }
                    self.last_seq = Some(event.seq);
                    return Some(SubscriptionItem::Event(event));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Some(SubscriptionItem::Lagged(skipped));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
