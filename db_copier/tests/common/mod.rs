//! In-memory connector shared by the integration tests
//!
//! Records every open and close in order and can fail at any step.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use db_copier::config::{DatabaseConfig, JobConfig, SshConfig};
use db_copier::schema::types::{CatalogColumn, TableDefinition};
use db_copier::transfer::{Record, RowBatch, Value};
use db_copier::{Connector, Error, Result, Store, Tunnel};

/// Steps the fake can be told to fail at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailAt {
    OpenTunnel,
    ConnectSource,
    ConnectTarget,
    Fetch,
    Recreate,
    Load,
    /// Fail the load of one named table only
    LoadOf(&'static str),
    CloseSource,
}

#[derive(Default)]
pub struct FakeState {
    pub source_tables: HashMap<String, RowBatch>,
    pub target_catalog: HashMap<String, Vec<CatalogColumn>>,
    pub target_tables: HashMap<String, RowBatch>,
    pub events: Vec<String>,
    pub failures: HashSet<FailAt>,
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_table(self, name: &str, batch: RowBatch) -> Self {
        self.state.lock().unwrap().source_tables.insert(name.to_string(), batch);
        self
    }

    pub fn with_target_catalog(self, name: &str, columns: Vec<CatalogColumn>) -> Self {
        self.state.lock().unwrap().target_catalog.insert(name.to_string(), columns);
        self
    }

    pub fn failing_at(self, step: FailAt) -> Self {
        self.state.lock().unwrap().failures.insert(step);
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    /// Events that open or close a resource, in order
    pub fn lifecycle(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.starts_with("open") || e.starts_with("connect") || e.starts_with("close"))
            .collect()
    }

    pub fn target_table(&self, name: &str) -> Option<RowBatch> {
        self.state.lock().unwrap().target_tables.get(name).cloned()
    }

    fn record(&self, event: &str) {
        self.state.lock().unwrap().events.push(event.to_string());
    }

    fn fails(&self, step: FailAt) -> bool {
        self.state.lock().unwrap().failures.contains(&step)
    }

    fn fails_load_of(&self, table: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .failures
            .iter()
            .any(|f| matches!(f, FailAt::LoadOf(name) if *name == table))
    }
}

/// Reject text longer than a `varchar(n)` column, as an insert would
fn check_lengths(definition: &TableDefinition, batch: &RowBatch) -> Result<()> {
    for column in &definition.columns {
        let limit = column
            .data_type
            .strip_prefix("varchar(")
            .or_else(|| column.data_type.strip_prefix("character varying("))
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|n| n.parse::<usize>().ok());
        let Some(limit) = limit else { continue };

        for row in batch.rows() {
            if let Some(Value::Text(text)) = row.get(&column.name) {
                if text.chars().count() > limit {
                    return Err(Error::ConnectivityError(format!(
                        "value too long for type character varying({})",
                        limit
                    )));
                }
            }
        }
    }
    Ok(())
}

pub struct FakeTunnel {
    connector: FakeConnector,
    closed: bool,
}

#[async_trait]
impl Tunnel for FakeTunnel {
    fn local_port(&self) -> u16 {
        40000
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.connector.record("close_tunnel");
        }
        Ok(())
    }
}

pub struct FakeStore {
    connector: FakeConnector,
    role: &'static str,
    closed: bool,
}

#[async_trait]
impl Store for FakeStore {
    async fn fetch_rows(&mut self, table: &str, columns: &[String]) -> Result<RowBatch> {
        self.connector.record(&format!("fetch {}", table));
        if self.connector.fails(FailAt::Fetch) {
            return Err(Error::ConnectivityError("connection reset".into()));
        }

        let state = self.connector.state.lock().unwrap();
        let stored = state
            .source_tables
            .get(table)
            .ok_or_else(|| Error::ConnectivityError(format!("relation {} does not exist", table)))?;

        if columns.is_empty() {
            return Ok(stored.clone());
        }
        if let Some(missing) = columns.iter().find(|c| !stored.has_column(c)) {
            return Err(Error::ConnectivityError(format!("column {} does not exist", missing)));
        }

        let mut batch = RowBatch::new(columns.to_vec());
        for row in stored.rows() {
            let record: Record = columns
                .iter()
                .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                .collect();
            batch.push(record);
        }
        Ok(batch)
    }

    async fn catalog_columns(&mut self, table: &str) -> Result<Vec<CatalogColumn>> {
        let state = self.connector.state.lock().unwrap();
        Ok(state.target_catalog.get(table).cloned().unwrap_or_default())
    }

    async fn recreate_table(&mut self, definition: &TableDefinition) -> Result<()> {
        self.connector.record(&format!("recreate {}", definition.name));
        if self.connector.fails(FailAt::Recreate) {
            return Err(Error::ConnectivityError("permission denied".into()));
        }

        let columns = definition.columns.iter().map(|c| c.name.clone()).collect();
        let catalog = definition
            .columns
            .iter()
            .map(|c| CatalogColumn {
                not_null: !c.nullable,
                ..CatalogColumn::simple(&c.name, &c.data_type)
            })
            .collect();

        let mut state = self.connector.state.lock().unwrap();
        state.target_tables.insert(definition.name.clone(), RowBatch::new(columns));
        state.target_catalog.insert(definition.name.clone(), catalog);
        Ok(())
    }

    async fn load_rows(&mut self, definition: &TableDefinition, batch: &RowBatch, chunk_rows: usize) -> Result<u64> {
        self.connector.record(&format!("load {}", definition.name));
        if self.connector.fails(FailAt::Load) || self.connector.fails_load_of(&definition.name) {
            return Err(Error::ConnectivityError("invalid input syntax".into()));
        }
        check_lengths(definition, batch)?;

        let mut state = self.connector.state.lock().unwrap();
        let table = state
            .target_tables
            .get_mut(&definition.name)
            .ok_or_else(|| Error::ConnectivityError(format!("relation {} does not exist", definition.name)))?;

        let mut loaded = 0;
        for chunk in batch.chunks(chunk_rows) {
            for row in chunk {
                table.push(row.clone());
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    async fn ping(&mut self) -> Result<()> {
        self.connector.record(&format!("ping_{}", self.role));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.connector.record(&format!("close_{}", self.role));
        if self.role == "source" && self.connector.fails(FailAt::CloseSource) {
            return Err(Error::ConnectivityError("broken pipe".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Tunnel = FakeTunnel;
    type Store = FakeStore;

    async fn open_tunnel(&self, _ssh: &SshConfig, _remote_host: &str, _remote_port: u16) -> Result<FakeTunnel> {
        if self.fails(FailAt::OpenTunnel) {
            return Err(Error::ConnectivityError("authentication failed".into()));
        }
        self.record("open_tunnel");
        Ok(FakeTunnel {
            connector: self.clone(),
            closed: false,
        })
    }

    async fn connect_source(&self, _db: &DatabaseConfig, tunnel: &FakeTunnel) -> Result<FakeStore> {
        assert_eq!(tunnel.local_port(), 40000);
        if self.fails(FailAt::ConnectSource) {
            return Err(Error::ConnectivityError("source refused".into()));
        }
        self.record("connect_source");
        Ok(FakeStore {
            connector: self.clone(),
            role: "source",
            closed: false,
        })
    }

    async fn connect_target(&self, _db: &DatabaseConfig) -> Result<FakeStore> {
        if self.fails(FailAt::ConnectTarget) {
            return Err(Error::ConnectivityError("target refused".into()));
        }
        self.record("connect_target");
        Ok(FakeStore {
            connector: self.clone(),
            role: "target",
            closed: false,
        })
    }
}

/// A valid job with password auth and the given tables section
pub fn job_config(tables_yaml: &str) -> JobConfig {
    let yaml = format!(
        r#"
ssh:
  host: bastion.example.com
  username: deploy
  password: secret
source_db:
  host: 10.0.0.5
  database: prod
  username: reader
  password: pw
target_db:
  host: localhost
  database: staging
  username: writer
  password: pw
tables:
{}
"#,
        tables_yaml
    );
    JobConfig::from_yaml(&yaml).expect("test config is valid")
}

/// The users table from the masking walkthrough
pub fn users_batch() -> RowBatch {
    RowBatch::from_rows(
        vec!["id".into(), "email".into(), "name".into()],
        vec![
            vec![Value::Int(1), "alice@x.com".into(), "Alice".into()],
            vec![Value::Int(2), "bob@y.com".into(), "Bob".into()],
        ],
    )
}

pub fn users_catalog() -> Vec<CatalogColumn> {
    vec![
        CatalogColumn::simple("id", "integer"),
        CatalogColumn::simple("email", "text"),
        CatalogColumn::simple("name", "text"),
    ]
}
