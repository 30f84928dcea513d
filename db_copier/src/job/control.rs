//! Per-job status and cancellation channels
//!
//! Each job owns one `watch` channel for its status and one for cancellation.
//! The running job holds the status sender and the cancel receiver; whoever
//! watches the job holds the other ends. No status state is shared between jobs.

use tokio::sync::watch;

use crate::job::types::CopyResult;

/// The running job's end: publishes status, observes cancellation
pub struct JobControl {
    status: watch::Sender<CopyResult>,
    cancel: watch::Receiver<bool>,
}

/// The observer's end: reads status, requests cancellation
#[derive(Clone)]
pub struct JobMonitor {
    status: watch::Receiver<CopyResult>,
    cancel: watch::Sender<bool>,
}

impl JobControl {
    /// Create a connected control/monitor pair for a new job
    pub fn new() -> (JobControl, JobMonitor) {
        let (status_tx, status_rx) = watch::channel(CopyResult::pending());
        let (cancel_tx, cancel_rx) = watch::channel(false);

        (
            JobControl {
                status: status_tx,
                cancel: cancel_rx,
            },
            JobMonitor {
                status: status_rx,
                cancel: cancel_tx,
            },
        )
    }

    /// A control nobody observes or cancels
    pub fn detached() -> JobControl {
        Self::new().0
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Apply a change to the published status
    pub fn update<F>(&self, change: F)
    where
        F: FnOnce(&mut CopyResult),
    {
        self.status.send_modify(change);
    }

    /// Current published status
    pub fn snapshot(&self) -> CopyResult {
        self.status.borrow().clone()
    }
}

impl JobMonitor {
    /// Latest status published by the job
    pub fn status(&self) -> CopyResult {
        self.status.borrow().clone()
    }

    /// A receiver that is notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<CopyResult> {
        self.status.clone()
    }

    /// Ask the job to stop before its next table
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Wait until the job reaches Completed or Failed
    pub async fn wait(&self) -> CopyResult {
        let mut status = self.status.clone();
        loop {
            let current = status.borrow_and_update().clone();
            if current.is_finished() {
                return current;
            }
            if status.changed().await.is_err() {
                // The job is gone; its last word is final
                return status.borrow().clone();
            }
        }
    }
}
