//! Job execution
//!
//! A job opens the SSH tunnel, connects to the source through it, connects to
//! the target directly, then copies each configured table in order. Every
//! resource is parked in a [`ResourceGuard`] as soon as it opens and released
//! once the job is over, whether it succeeded or not.

use indexmap::IndexMap;

use crate::config::{JobConfig, SshConfig};
use crate::db::{Connector, PostgresConnector, ResourceGuard, Store, TunnelManager};
use crate::error::{Error, Result};
use crate::job::control::JobControl;
use crate::job::types::CopyResult;
use crate::schema::introspector::SchemaIntrospector;
use crate::schema::types::Column;
use crate::transfer::TableCopyPipeline;

/// Which database a connectivity check targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

/// Copy every table of a job using the PostgreSQL connector
pub async fn copy_all_tables(config: &JobConfig) -> Result<CopyResult> {
    run_job(&PostgresConnector, config, &JobControl::detached()).await
}

/// Describe every configured table on the target using the PostgreSQL connector
pub async fn describe_tables(config: &JobConfig) -> Result<IndexMap<String, Vec<Column>>> {
    run_describe(&PostgresConnector, config).await
}

/// Open and authenticate an SSH session, then close it
pub async fn check_ssh(ssh: &SshConfig) -> Result<()> {
    TunnelManager::check(ssh).await
}

/// Connect to one side of a job and round-trip `SELECT 1`
pub async fn check_database(config: &JobConfig, side: Side) -> Result<()> {
    check_database_with(&PostgresConnector, config, side).await
}

/// Run a copy job, publishing its progress through `control`
pub async fn run_job<C: Connector>(
    connector: &C,
    config: &JobConfig,
    control: &JobControl,
) -> Result<CopyResult> {
    if let Err(e) = config.validate() {
        control.update(|r| r.mark_failed(e.to_string()));
        return Err(e);
    }

    control.update(CopyResult::mark_running);
    tracing::info!(tables = config.tables.len(), "Starting copy job");

    let mut guard = ResourceGuard::new();
    let outcome = copy_tables(connector, config, control, &mut guard).await;

    let failures = guard.release().await;
    if failures > 0 {
        tracing::warn!(failures, "Some job resources did not close cleanly");
    }

    match outcome {
        Ok(()) => {
            control.update(CopyResult::mark_completed);
            let result = control.snapshot();
            tracing::info!(
                tables = result.tables.len(),
                rows = result.total_rows(),
                "Copy job completed"
            );
            Ok(result)
        }
        Err(e) => {
            tracing::error!(error = %e, "Copy job failed");
            control.update(|r| r.mark_failed(e.to_string()));
            Err(e)
        }
    }
}

async fn copy_tables<C: Connector>(
    connector: &C,
    config: &JobConfig,
    control: &JobControl,
    guard: &mut ResourceGuard<C::Tunnel, C::Store>,
) -> Result<()> {
    let tunnel = connector
        .open_tunnel(&config.ssh, &config.source_db.host, config.source_db.port)
        .await?;
    let tunnel = guard.hold_tunnel(tunnel);

    let source = connector.connect_source(&config.source_db, tunnel).await?;
    guard.hold_source(source);
    tracing::info!(database = %config.source_db.database, "Connected to source");

    let target = connector.connect_target(&config.target_db).await?;
    guard.hold_target(target);
    tracing::info!(database = %config.target_db.database, "Connected to target");

    let (source, target) = guard
        .connections()
        .ok_or_else(|| Error::ConnectivityError("job connections are not open".into()))?;
    let mut pipeline = TableCopyPipeline::new(source, target);

    for spec in &config.tables {
        if control.is_cancelled() {
            tracing::warn!(table = %spec.name, "Job cancelled");
            return Err(Error::Cancelled(spec.name.clone()));
        }

        let result = pipeline.copy_table(spec).await?;
        control.update(|r| r.record_table(result));
    }

    Ok(())
}

/// Resolve the target definition of every configured table
pub async fn run_describe<C: Connector>(
    connector: &C,
    config: &JobConfig,
) -> Result<IndexMap<String, Vec<Column>>> {
    config.validate()?;

    let mut target = connector.connect_target(&config.target_db).await?;
    let described = describe_all(&mut target, config).await;

    if let Err(e) = target.close().await {
        tracing::warn!(error = %e, "Failed to close target connection");
    }

    described
}

async fn describe_all<S: Store>(target: &mut S, config: &JobConfig) -> Result<IndexMap<String, Vec<Column>>> {
    let mut tables = IndexMap::new();
    let mut introspector = SchemaIntrospector::new(target);

    for spec in &config.tables {
        let definition = introspector.describe(&spec.name, &spec.column_types).await?;
        tracing::info!(table = %spec.name, columns = definition.columns.len(), "Described table");
        tables.insert(spec.name.clone(), definition.columns);
    }

    Ok(tables)
}

/// Connectivity check against a given connector
pub async fn check_database_with<C: Connector>(connector: &C, config: &JobConfig, side: Side) -> Result<()> {
    config.validate()?;

    let mut guard = ResourceGuard::new();
    let outcome = ping_side(connector, config, side, &mut guard).await;
    guard.release().await;

    if outcome.is_ok() {
        tracing::info!(side = ?side, "Database connection check succeeded");
    }
    outcome
}

async fn ping_side<C: Connector>(
    connector: &C,
    config: &JobConfig,
    side: Side,
    guard: &mut ResourceGuard<C::Tunnel, C::Store>,
) -> Result<()> {
    match side {
        Side::Source => {
            let tunnel = connector
                .open_tunnel(&config.ssh, &config.source_db.host, config.source_db.port)
                .await?;
            let tunnel = guard.hold_tunnel(tunnel);
            let source = connector.connect_source(&config.source_db, tunnel).await?;
            guard.hold_source(source).ping().await
        }
        Side::Target => {
            let target = connector.connect_target(&config.target_db).await?;
            guard.hold_target(target).ping().await
        }
    }
}
