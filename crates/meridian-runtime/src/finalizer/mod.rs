//! C7: Terminal-State Finalizer. One background task per submitted
//! workflow, polling the engine until terminal, then reconciling C2's
//! terminal fields and token aggregates (§4.7).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use meridian_core::engine::{DescribeResult, EngineClient};
use meridian_core::task::{merge_token_totals, TaskStatus};
use tracing::{info, warn};

use crate::ledger::Ledger;

const MAX_CONSECUTIVE_ERRORS: u32 = 12;
const ITERATION_WAIT: Duration = Duration::from_secs(300);
const POLL_INTERVAL: Duration = Duration::from_secs(10);
const CONFIRMATION_ATTEMPTS: u32 = 6;
const CONFIRMATION_INTERVAL: Duration = Duration::from_secs(2);

pub struct Finalizer {
    ledger: Ledger,
    engine: Arc<dyn EngineClient>,
    running: Mutex<HashSet<String>>,
}

impl Finalizer {
    pub fn new(ledger: Ledger, engine: Arc<dyn EngineClient>) -> Arc<Self> {
        Arc::new(Self {
            ledger,
            engine,
            running: Mutex::new(HashSet::new()),
        })
    }

    /// Spawns a detached watcher for `workflow_id` unless one is already
    /// running — at most one finalizer per workflow, per §4.7's
    /// concurrency requirement.
    pub fn spawn(self: &Arc<Self>, workflow_id: String, run_id: String) {
        {
            let mut running = self.running.lock().unwrap();
            if !running.insert(workflow_id.clone()) {
                return;
            }
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.watch(&workflow_id, &run_id).await;
            this.running.lock().unwrap().remove(&workflow_id);
        });
    }

    /// Restart-time relaunch: one finalizer per still-open ledger row.
    /// Guarded cluster-wide by leader election at the call site so only
    /// one replica performs the sweep.
    pub async fn relaunch_open_tasks(self: &Arc<Self>, workflow_ids: Vec<String>) {
        for workflow_id in workflow_ids {
            self.spawn(workflow_id, String::new());
        }
    }

    async fn watch(&self, workflow_id: &str, run_id: &str) {
        let mut consecutive_errors: u32 = 0;

        loop {
            let iteration_deadline = Instant::now() + ITERATION_WAIT;
            let mut terminal: Option<DescribeResult> = None;

            while Instant::now() < iteration_deadline {
                match self.engine.describe(workflow_id).await {
                    Ok(describe) => {
                        consecutive_errors = 0;
                        if describe.status.is_terminal() {
                            terminal = Some(describe);
                            break;
                        }
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        warn!(error = %e, workflow_id, consecutive_errors, "finalizer describe failed");
                        if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                            self.give_up(workflow_id).await;
                            return;
                        }
                        let backoff = Duration::from_secs(10u64.saturating_mul(1u64 << consecutive_errors.min(5)).min(300));
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }

            if let Some(describe) = terminal {
                self.finalize(workflow_id, run_id, describe).await;
                return;
            }
        }
    }

    async fn finalize(&self, workflow_id: &str, _run_id: &str, describe: DescribeResult) {
        let end_time = describe.close_time.unwrap_or_else(Utc::now);
        let new_status = describe.status.to_task_status();

        if let Err(e) = self
            .ledger
            .update_status(workflow_id, new_status, Some(end_time), None, None, None)
            .await
        {
            warn!(error = %e, workflow_id, "finalizer terminal status write failed");
        }

        for _ in 0..CONFIRMATION_ATTEMPTS {
            match self.ledger.get_by_workflow_id(workflow_id).await {
                Ok(Some(task)) => {
                    self.reconcile_aggregates(&task).await;
                    if task.total_tokens > 0 || task.result.is_some() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, workflow_id, "finalizer confirmation read failed"),
            }
            tokio::time::sleep(CONFIRMATION_INTERVAL).await;
        }
        info!(workflow_id, "finalizer confirmation loop exhausted, leaving final state as observed");
    }

    async fn reconcile_aggregates(&self, task: &meridian_core::task::TaskExecution) {
        let aggregate = match self.ledger.aggregate_tokens(task.id).await {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, workflow_id = %task.workflow_id, "aggregate read failed");
                return;
            }
        };
        let mut merged = task.clone();
        merge_token_totals(&mut merged, aggregate);
        if let Err(e) = self.ledger.upsert_full(&merged).await {
            warn!(error = %e, workflow_id = %task.workflow_id, "aggregate reconciliation write failed");
        }
    }

    /// Marks the task `FAILED` with a "monitoring failed" error after the
    /// retry budget is exhausted, so it never stays stuck `RUNNING`.
    async fn give_up(&self, workflow_id: &str) {
        warn!(workflow_id, "finalizer giving up after exhausting retry budget");
        if let Err(e) = self
            .ledger
            .update_status(
                workflow_id,
                TaskStatus::Failed,
                Some(Utc::now()),
                None,
                None,
                Some("monitoring failed"),
            )
            .await
        {
            warn!(error = %e, workflow_id, "finalizer give-up status write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps_at_300s() {
        for n in 0u32..12 {
            let backoff = Duration::from_secs(10u64.saturating_mul(1u64 << n.min(5)).min(300));
            assert!(backoff <= Duration::from_secs(300));
        }
    }
}
