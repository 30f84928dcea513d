//! Background job tracking
//!
//! The tracker spawns each submitted job on its own task and keeps only the
//! observer end of that job's channels. Status lives in the job's own watch
//! channel, so jobs never contend on a shared status record.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::JobConfig;
use crate::db::{Connector, PostgresConnector};
use crate::error::Result;
use crate::job::control::{JobControl, JobMonitor};
use crate::job::runner::run_job;
use crate::job::types::CopyResult;

/// Runs copy jobs in the background and reports their status by id
pub struct JobTracker<C: Connector + 'static = PostgresConnector> {
    connector: Arc<C>,
    jobs: Mutex<HashMap<Uuid, JobMonitor>>,
}

impl Default for JobTracker<PostgresConnector> {
    fn default() -> Self {
        Self::new(PostgresConnector)
    }
}

impl<C: Connector + 'static> JobTracker<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Validate a job and start it on its own task; returns the job id
    pub fn submit(&self, config: JobConfig) -> Result<Uuid> {
        config.validate()?;

        let id = Uuid::new_v4();
        let (control, monitor) = JobControl::new();
        self.lock().insert(id, monitor);

        let connector = Arc::clone(&self.connector);
        tokio::spawn(
            async move {
                // The outcome is already published through the status channel
                if let Err(e) = run_job(connector.as_ref(), &config, &control).await {
                    tracing::debug!(error = %e, "Job ended with error");
                }
            }
            .instrument(tracing::info_span!("job", id = %id)),
        );

        tracing::info!(job = %id, "Job submitted");
        Ok(id)
    }

    /// Latest status of a job
    pub fn status(&self, id: &Uuid) -> Option<CopyResult> {
        self.lock().get(id).map(JobMonitor::status)
    }

    /// Latest status of every known job
    pub fn statuses(&self) -> HashMap<Uuid, CopyResult> {
        self.lock()
            .iter()
            .map(|(id, monitor)| (*id, monitor.status()))
            .collect()
    }

    /// A receiver notified on every status change of a job
    pub fn subscribe(&self, id: &Uuid) -> Option<watch::Receiver<CopyResult>> {
        self.lock().get(id).map(JobMonitor::subscribe)
    }

    /// Request cancellation; returns false for an unknown job
    pub fn cancel(&self, id: &Uuid) -> bool {
        match self.lock().get(id) {
            Some(monitor) => {
                monitor.cancel();
                tracing::info!(job = %id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Wait for a job to finish
    pub async fn wait(&self, id: &Uuid) -> Option<CopyResult> {
        let monitor = self.lock().get(id).cloned()?;
        Some(monitor.wait().await)
    }

    /// Forget finished jobs; returns how many were removed
    pub fn remove_finished(&self) -> usize {
        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|_, monitor| !monitor.status().is_finished());
        before - jobs.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, JobMonitor>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
