use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use meridian_core::cluster::LeaderRole;
use meridian_core::error::{CoreError, Result};
use sqlx::PgPool;
use tracing::info;

/// Leader election over a single [`LeaderRole`], backed by a Postgres
/// advisory lock. Whichever instance holds the lock runs that role's
/// housekeeping (here: the finalizer relaunch-on-restart sweep); the rest
/// poll [`Self::try_become_leader`] periodically in case the holder dies
/// (advisory locks release automatically when their session disconnects).
pub struct LeaderElection {
    pool: PgPool,
    role: LeaderRole,
    is_leader: Arc<AtomicBool>,
}

impl LeaderElection {
    pub fn new(pool: PgPool, role: LeaderRole) -> Self {
        Self {
            pool,
            role,
            is_leader: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// Non-blocking attempt to acquire the advisory lock for this role.
    /// Safe to call repeatedly; a held lock is re-affirmed as a no-op by
    /// Postgres (same session re-acquiring its own lock succeeds).
    pub async fn try_become_leader(&self) -> Result<bool> {
        let row: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .bind(self.role.lock_id())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CoreError::Database(format!("try acquire leader lock: {e}")))?;
        let acquired = row.0;
        let was_leader = self.is_leader.swap(acquired, Ordering::SeqCst);
        if acquired && !was_leader {
            info!(role = ?self.role, "became leader");
        }
        Ok(acquired)
    }

    /// Runs the given housekeeping closure repeatedly on `interval`, but
    /// only while this instance holds leadership.
    pub async fn run_while_leader<F, Fut>(&self, interval: Duration, mut housekeeping: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.try_become_leader().await {
                Ok(true) => housekeeping().await,
                Ok(false) => {}
                Err(e) => tracing::warn!(error = %e, "leader election check failed"),
            }
        }
    }
}
