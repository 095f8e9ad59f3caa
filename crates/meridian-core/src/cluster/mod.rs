use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Unique identifier for a running core instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role(s) a core instance assumes. An instance may serve the gRPC surface,
/// run finalizers/streaming fan-out, or both (`All`, the common single-node
/// deployment).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Gateway,
    Worker,
    All,
}

impl NodeRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gateway => "gateway",
            Self::Worker => "worker",
            Self::All => "all",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "gateway" => Some(Self::Gateway),
            "worker" => Some(Self::Worker),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn serves_gateway(self) -> bool {
        matches!(self, Self::Gateway | Self::All)
    }

    pub fn serves_background_work(self) -> bool {
        matches!(self, Self::Worker | Self::All)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Joining,
    Active,
    Draining,
    Dead,
}

impl NodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Joining => "joining",
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Dead => "dead",
        }
    }
}

/// A registered core instance.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: NodeId,
    pub hostname: String,
    pub role: NodeRole,
    pub status: NodeStatus,
    pub last_heartbeat: DateTime<Utc>,
}

impl NodeInfo {
    pub fn new(hostname: impl Into<String>, role: NodeRole) -> Self {
        Self {
            id: NodeId::new(),
            hostname: hostname.into(),
            role,
            status: NodeStatus::Joining,
            last_heartbeat: Utc::now(),
        }
    }

    /// A node is considered dead once its heartbeat is older than this.
    pub fn is_stale(&self, max_age: chrono::Duration) -> bool {
        Utc::now() - self.last_heartbeat > max_age
    }
}

/// The single leader-only role this core needs: cron-schedule validation
/// dispatch and Terminal-State Finalizer relaunch-on-restart sweeps must run
/// exactly once cluster-wide, not once per replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderRole {
    FinalizerSweep,
}

impl LeaderRole {
    /// PostgreSQL advisory lock ID backing leader election for this role.
    pub fn lock_id(self) -> i64 {
        match self {
            Self::FinalizerSweep => 0x4D455249_4449_0001,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_string() {
        for role in [NodeRole::Gateway, NodeRole::Worker, NodeRole::All] {
            assert_eq!(NodeRole::from_str(role.as_str()), Some(role));
        }
    }

    #[test]
    fn stale_detection() {
        let mut node = NodeInfo::new("host-1", NodeRole::All);
        node.last_heartbeat = Utc::now() - chrono::Duration::minutes(10);
        assert!(node.is_stale(chrono::Duration::minutes(1)));
        assert!(!node.is_stale(chrono::Duration::minutes(30)));
    }
}
