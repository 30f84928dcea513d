//! Job module for db_copier
//!
//! Runs copy jobs, reports their status and exposes connectivity checks.

pub mod control;
pub mod runner;
pub mod tracker;
pub mod types;

// Re-export key types
pub use control::{JobControl, JobMonitor};
pub use runner::{
    check_database, check_database_with, check_ssh, copy_all_tables, describe_tables, run_describe, run_job,
    Side,
};
pub use tracker::JobTracker;
pub use types::{CopyResult, JobStatus};
