//! Database connection handling
//!
//! This module opens the source connection (through the tunnel) and the
//! target connection (direct), and implements the row-level operations the
//! copy pipeline needs on top of a single `PgConnection` each.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{Column as _, ConnectOptions, Connection, Executor, PgConnection, Postgres, QueryBuilder, Row, TypeInfo};
use std::fmt;

use crate::config::{DatabaseConfig, SshConfig};
use crate::db::tunnel::{TunnelHandle, TunnelManager};
use crate::db::{Connector, Store, Tunnel};
use crate::error::{Error, Phase, Result};
use crate::schema::generator;
use crate::schema::types::{CatalogColumn, TableDefinition};
use crate::transfer::rows::{Record, RowBatch, Value};
use crate::utils::naming;

/// Which end of the copy a connection serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Target,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Source => f.write_str("source"),
            Role::Target => f.write_str("target"),
        }
    }
}

/// Opens source and target connections
pub struct ConnectionManager;

impl ConnectionManager {
    /// Connect to the source database through the tunnel's local port
    pub async fn connect_source(db: &DatabaseConfig, tunnel: &dyn Tunnel) -> Result<ConnectionHandle> {
        Self::connect(db, "127.0.0.1", tunnel.local_port(), Role::Source).await
    }

    /// Connect directly to the target database
    pub async fn connect_target(db: &DatabaseConfig) -> Result<ConnectionHandle> {
        Self::connect(db, &db.host, db.port, Role::Target).await
    }

    async fn connect(db: &DatabaseConfig, host: &str, port: u16, role: Role) -> Result<ConnectionHandle> {
        let options = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(&db.database)
            .username(&db.username)
            .password(&db.password)
            .application_name("db_copier");

        tracing::info!(%role, host, port, database = %db.database, "Connecting to database");

        let conn = tokio::time::timeout(db.timeout(), options.connect())
            .await
            .map_err(|_| {
                Error::ConnectivityError(format!("{} database {}:{} timed out", role, host, port))
            })?
            .map_err(|e| Error::connectivity(&format!("{} database {}:{} failed", role, host, port), e))?;

        Ok(ConnectionHandle {
            role,
            conn: Some(conn),
        })
    }
}

/// A live connection; closed exactly once
pub struct ConnectionHandle {
    role: Role,
    conn: Option<PgConnection>,
}

impl ConnectionHandle {
    fn conn(&mut self) -> Result<&mut PgConnection> {
        let role = self.role;
        self.conn
            .as_mut()
            .ok_or_else(|| Error::ConnectivityError(format!("{} connection is already closed", role)))
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if self.conn.is_some() {
            tracing::warn!(role = %self.role, "Database connection dropped without being closed");
        }
    }
}

const CATALOG_SQL: &str = r#"
    SELECT
        a.attname::text AS column_name,
        pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
        tn.nspname::text AS type_schema,
        t.typname::text AS type_name,
        a.attnotnull AS not_null
    FROM pg_catalog.pg_attribute a
    JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
    JOIN pg_catalog.pg_namespace tn ON tn.oid = t.typnamespace
    WHERE n.nspname = COALESCE($1::text, current_schema()::text)
      AND c.relname = $2
      AND c.relkind IN ('r', 'p')
      AND a.attnum > 0
      AND NOT a.attisdropped
    ORDER BY a.attnum
"#;

#[async_trait]
impl Store for ConnectionHandle {
    async fn fetch_rows(&mut self, table: &str, columns: &[String]) -> Result<RowBatch> {
        let sql = generator::select_sql(table, columns);
        let conn = self.conn()?;

        // No bind arguments, so this runs over the simple-query protocol and
        // every value arrives in its text form
        let rows: Vec<PgRow> = (&mut *conn).fetch_all(sql.as_str()).await?;

        let names: Vec<String> = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => (&mut *conn)
                .describe(sql.as_str())
                .await?
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
        };

        let mut batch = RowBatch::new(names);
        for row in &rows {
            batch.push(decode_row(row)?);
        }

        Ok(batch)
    }

    async fn catalog_columns(&mut self, table: &str) -> Result<Vec<CatalogColumn>> {
        let (schema, name) = naming::split_qualified(table);
        let conn = self.conn()?;

        let columns = sqlx::query_as::<_, CatalogColumn>(CATALOG_SQL)
            .bind(schema)
            .bind(name)
            .fetch_all(&mut *conn)
            .await?;

        Ok(columns)
    }

    async fn recreate_table(&mut self, definition: &TableDefinition) -> Result<()> {
        let drop_sql = generator::drop_table_sql(&definition.name);
        let create_sql = generator::create_table_sql(definition);
        let conn = self.conn()?;

        let mut tx = conn.begin().await?;
        sqlx::query(&drop_sql).execute(&mut *tx).await?;
        sqlx::query(&create_sql).execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn load_rows(
        &mut self,
        definition: &TableDefinition,
        batch: &RowBatch,
        chunk_rows: usize,
    ) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let columns = batch.columns();
        let casts = columns
            .iter()
            .map(|name| {
                definition
                    .column(name)
                    .map(|c| format!("::{}", generator::cast_type(c)))
                    .ok_or_else(|| {
                        Error::schema(&definition.name, Phase::Load, format!("column {} is not defined", name))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let prefix = generator::insert_prefix(&definition.name, columns);
        let per_statement = generator::rows_per_statement(chunk_rows, columns.len());
        let conn = self.conn()?;

        let mut tx = conn.begin().await?;
        let mut written = 0u64;

        for chunk in batch.chunks(per_statement) {
            let mut builder = QueryBuilder::<Postgres>::new(prefix.as_str());
            builder.push_values(chunk, |mut row, record| {
                for (name, cast) in columns.iter().zip(&casts) {
                    match record.get(name).unwrap_or(&Value::Null) {
                        Value::Null => row.push_bind(None::<String>),
                        Value::Bool(b) => row.push_bind(*b),
                        Value::Int(i) => row.push_bind(*i),
                        Value::Float(x) => row.push_bind(*x),
                        Value::Text(s) => row.push_bind(s.clone()),
                    };
                    row.push_unseparated(cast.as_str());
                }
            });

            let result = builder.build().execute(&mut *tx).await?;
            written += result.rows_affected();
            tracing::debug!(table = %definition.name, written, "Loaded chunk");
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn ping(&mut self) -> Result<()> {
        let conn = self.conn()?;
        sqlx::query("SELECT 1").execute(conn).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
            tracing::info!(role = %self.role, "Database connection closed");
        }
        Ok(())
    }
}

/// Decode a row fetched in text format into typed values
fn decode_row(row: &PgRow) -> Result<Record> {
    let mut record = Record::with_capacity(row.len());

    for (index, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
            "INT2" => row.try_get::<Option<i16>, _>(index)?.map(|v| Value::Int(v.into())),
            "INT4" => row.try_get::<Option<i32>, _>(index)?.map(|v| Value::Int(v.into())),
            "INT8" => row.try_get::<Option<i64>, _>(index)?.map(Value::Int),
            "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(|v| Value::Float(v.into())),
            "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(Value::Float),
            _ => row.try_get_unchecked::<Option<String>, _>(index)?.map(Value::Text),
        };

        record.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }

    Ok(record)
}

/// Connector backed by russh tunnels and sqlx PostgreSQL connections
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConnector;

#[async_trait]
impl Connector for PostgresConnector {
    type Tunnel = TunnelHandle;
    type Store = ConnectionHandle;

    async fn open_tunnel(&self, ssh: &SshConfig, remote_host: &str, remote_port: u16) -> Result<TunnelHandle> {
        TunnelManager::open(ssh, remote_host, remote_port).await
    }

    async fn connect_source(&self, db: &DatabaseConfig, tunnel: &TunnelHandle) -> Result<ConnectionHandle> {
        ConnectionManager::connect_source(db, tunnel).await
    }

    async fn connect_target(&self, db: &DatabaseConfig) -> Result<ConnectionHandle> {
        ConnectionManager::connect_target(db).await
    }
}
