//! Database module for db_copier
//!
//! This module owns the tunnel, the two database connections and the guard
//! that releases them. The traits below are the seam between the copy logic
//! and the concrete PostgreSQL/SSH implementations.

pub mod connection;
pub mod guard;
pub mod tunnel;

use async_trait::async_trait;

use crate::config::{DatabaseConfig, SshConfig};
use crate::error::Result;
use crate::schema::types::{CatalogColumn, TableDefinition};
use crate::transfer::rows::RowBatch;

// Re-export key types
pub use connection::{ConnectionHandle, ConnectionManager, PostgresConnector};
pub use guard::ResourceGuard;
pub use tunnel::{TunnelHandle, TunnelManager};

/// An open forwarding channel exposing a remote port locally
#[async_trait]
pub trait Tunnel: Send + Sync {
    /// Local port the remote service is reachable on
    fn local_port(&self) -> u16;

    /// Tear the tunnel down; calling it again does nothing
    async fn close(&mut self) -> Result<()>;
}

/// A live connection to one database
#[async_trait]
pub trait Store: Send {
    /// Run the projection query for a table and materialise every row
    async fn fetch_rows(&mut self, table: &str, columns: &[String]) -> Result<RowBatch>;

    /// Catalog entries for a table in ordinal order, empty when the table does not exist
    async fn catalog_columns(&mut self, table: &str) -> Result<Vec<CatalogColumn>>;

    /// Drop and recreate a table from a definition as one unit
    async fn recreate_table(&mut self, definition: &TableDefinition) -> Result<()>;

    /// Insert a batch in chunks within one transaction, committing once
    async fn load_rows(
        &mut self,
        definition: &TableDefinition,
        batch: &RowBatch,
        chunk_rows: usize,
    ) -> Result<u64>;

    /// Round-trip a trivial query
    async fn ping(&mut self) -> Result<()>;

    /// Close the connection; calling it again does nothing
    async fn close(&mut self) -> Result<()>;
}

/// Opens the resources a job needs
#[async_trait]
pub trait Connector: Send + Sync {
    type Tunnel: Tunnel;
    type Store: Store;

    /// Open a tunnel to `remote_host:remote_port` as seen from the SSH server
    async fn open_tunnel(
        &self,
        ssh: &SshConfig,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Self::Tunnel>;

    /// Connect to the source database through an open tunnel
    async fn connect_source(&self, db: &DatabaseConfig, tunnel: &Self::Tunnel) -> Result<Self::Store>;

    /// Connect directly to the target database
    async fn connect_target(&self, db: &DatabaseConfig) -> Result<Self::Store>;
}
