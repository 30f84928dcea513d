//! Job status types

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::transfer::TableCopyResult;

/// Lifecycle of a copy job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Job-level status plus the per-table results reported so far
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CopyResult {
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub message: String,
    pub tables: Vec<TableCopyResult>,
}

impl Default for CopyResult {
    fn default() -> Self {
        Self::pending()
    }
}

impl CopyResult {
    pub fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            started_at: None,
            finished_at: None,
            message: "Job queued".to_string(),
            tables: Vec::new(),
        }
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        self.message = "Copy in progress".to_string();
    }

    pub fn record_table(&mut self, result: TableCopyResult) {
        self.message = format!("Copied table {}", result.table);
        self.tables.push(result);
    }

    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.message = format!(
            "Copied {} tables, {} rows",
            self.tables.len(),
            self.total_rows()
        );
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.message = message.into();
    }

    /// Whether the job reached a terminal status
    pub fn is_finished(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_copied).sum()
    }
}
