//! The host's single synchronization worker.
//!
//! Operations that mutate a live session (permission changes, disconnects) are
//! never executed inline. They are queued here and run one at a time, in
//! submission order, on a dedicated tokio task.

use crate::error::{CoreError, HostError};
use crate::unit::panic_message;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Serial executor for session-mutating jobs.
///
/// The worker task is started lazily on the first submission, on whichever
/// tokio runtime is current at that point.
pub struct SyncExecutor {
    sender: mpsc::UnboundedSender<Job>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SyncExecutor {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            worker: Mutex::new(None),
        }
    }

    /// Queues a job for the synchronization worker.
    pub fn submit<F>(&self, job: F) -> Result<(), CoreError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_worker()?;
        self.sender
            .send(Box::new(job))
            .map_err(|_| CoreError::Host(HostError::Command("synchronization worker stopped".to_string())))
    }

    /// Waits until every job submitted before this call has run.
    pub async fn flush(&self) -> Result<(), CoreError> {
        let (tx, rx) = oneshot::channel();
        self.submit(move || {
            let _ = tx.send(());
        })?;
        rx.await
            .map_err(|_| CoreError::Host(HostError::Command("synchronization worker stopped".to_string())))
    }

    fn ensure_worker(&self) -> Result<(), CoreError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let handle = tokio::runtime::Handle::try_current().map_err(|_| HostError::NoRuntime)?;
        let Some(mut receiver) = self.receiver.lock().take() else {
            return Err(HostError::Command("synchronization worker stopped".to_string()).into());
        };

        debug!("Starting synchronization worker");
        *worker = Some(handle.spawn(async move {
            while let Some(job) = receiver.recv().await {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
                    error!("Synchronization job failed: {}", panic_message(payload));
                }
            }
            debug!("Synchronization worker stopped");
        }));
        Ok(())
    }
}

impl Default for SyncExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SyncExecutor {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
    }
}
