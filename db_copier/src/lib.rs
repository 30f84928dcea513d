//! db_copier: copy PostgreSQL tables from behind an SSH bastion into a target database
//!
//! A job opens an SSH tunnel to the bastion, connects to the source database
//! through it and to the target database directly. Each configured table is
//! extracted, its sensitive columns are masked, the target table is dropped and
//! recreated from the target's own catalog definition, and the masked rows are
//! bulk-loaded. The tunnel and both connections are always released, target
//! first, whatever the outcome.

pub mod config;
pub mod db;
pub mod error;
pub mod job;
pub mod masking;
pub mod schema;
pub mod transfer;
pub mod utils;

// Re-export main types for easier access
pub use config::{DatabaseConfig, JobConfig, MaskRule, SshConfig, TableSpec};
pub use db::{Connector, PostgresConnector, ResourceGuard, Store, Tunnel};
pub use error::{Error, Phase, Result};
pub use job::{
    check_database, check_ssh, copy_all_tables, describe_tables, CopyResult, JobStatus, JobTracker, Side,
};
pub use masking::MaskMethod;
pub use schema::types::Column;
pub use transfer::{RowBatch, TableCopyResult, Value};
