use std::time::Duration;

use meridian_core::cluster::NodeId;
use tracing::{debug, warn};

use super::registry::NodeRegistry;

/// Periodically touches this node's `last_heartbeat`, detached from the
/// request path (§5 ambient stack).
pub struct Heartbeat {
    registry: NodeRegistry,
    node_id: NodeId,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(registry: NodeRegistry, node_id: NodeId, interval: Duration) -> Self {
        Self {
            registry,
            node_id,
            interval,
        }
    }

    /// Runs until `shutdown` resolves. Intended to be spawned as a detached
    /// task owned by the service lifetime.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.registry.touch_heartbeat(self.node_id).await {
                        warn!(error = %e, "heartbeat write failed");
                    } else {
                        debug!(node_id = %self.node_id, "heartbeat");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
