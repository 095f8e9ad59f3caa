//! The Task Ledger's bounded asynchronous write queue (§4.2, §5
//! back-pressure). `submit` always succeeds because the synchronous initial
//! row is written directly through [`super::Ledger::create_initial`]; this
//! queue only carries the follow-up full-row writes, and overflowing it is
//! an error returned to the caller, never a silent drop.

use std::time::Duration;

use meridian_core::error::{CoreError, Result};
use meridian_core::task::TaskExecution;
use tokio::sync::mpsc;

type Callback = Box<dyn FnOnce(Result<()>) + Send>;

struct WriteJob {
    task: TaskExecution,
    callback: Callback,
}

#[derive(Clone)]
pub struct LedgerWriteQueue {
    tx: mpsc::Sender<WriteJob>,
}

impl LedgerWriteQueue {
    /// Spawns the background drain task and returns a handle. `capacity`
    /// bounds how many writes may be in flight before `queue_write` starts
    /// returning `ResourceExhausted`.
    pub fn spawn(ledger: super::Ledger, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<WriteJob>(capacity);
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let result = ledger.upsert_full(&job.task).await;
                if let Err(ref e) = result {
                    tracing::warn!(error = %e, workflow_id = %job.task.workflow_id, "ledger write queue job failed");
                }
                (job.callback)(result);
            }
        });
        Self { tx }
    }

    pub fn queue_write(
        &self,
        task: TaskExecution,
        callback: impl FnOnce(Result<()>) + Send + 'static,
    ) -> Result<()> {
        self.tx
            .try_send(WriteJob {
                task,
                callback: Box::new(callback),
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => CoreError::ResourceExhausted {
                    message: "ledger write queue is full".to_string(),
                    retry_after: Duration::from_millis(200),
                },
                mpsc::error::TrySendError::Closed(_) => {
                    CoreError::Unavailable("ledger write queue worker has stopped".to_string())
                }
            })
    }
}
