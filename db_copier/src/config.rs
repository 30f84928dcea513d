//! Job configuration handling
//!
//! A job configuration names the SSH bastion, the source database behind it,
//! the directly reachable target database and the ordered list of tables to
//! copy. It is loaded once, validated before any network call and treated as
//! immutable for the lifetime of the job.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::masking::MaskMethod;
use crate::schema::types::Column;
use crate::utils::naming;

/// Load and validate a job configuration, picking the format by file extension
pub fn load_from_file(path: impl AsRef<Path>) -> Result<JobConfig> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path)
        .map_err(|e| Error::ConfigError(format!("Failed to read config file {}: {}", path.display(), e)))?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    let config: JobConfig = match extension.as_deref() {
        Some("toml") => toml::from_str(&config_str)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))?,
        Some("json") => serde_json::from_str(&config_str)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))?,
        _ => serde_yaml::from_str(&config_str)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))?,
    };

    config.validate()?;
    Ok(config)
}

/// Represents one complete copy job
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobConfig {
    pub ssh: SshConfig,
    pub source_db: DatabaseConfig,
    pub target_db: DatabaseConfig,
    pub tables: Vec<TableSpec>,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

/// SSH bastion through which the source database is reached
#[derive(Serialize, Deserialize, Clone)]
pub struct SshConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub private_key_passphrase: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub strict_host_key_checking: bool,
}

/// A way of authenticating against the SSH server
#[derive(Clone, PartialEq, Eq)]
pub enum SshAuth {
    PrivateKey {
        path: String,
        passphrase: Option<String>,
    },
    Password(String),
}

/// Database connection configuration
#[derive(Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// One table to copy
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TableSpec {
    pub name: String,
    /// Columns to select; empty selects all
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub mask_rules: Vec<MaskRule>,
    /// Definition used when the target catalog has no entry for the table
    #[serde(default)]
    pub column_types: Vec<Column>,
}

/// A per-column masking rule
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MaskRule {
    pub column: String,
    pub method: MaskMethod,
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub stdout: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            format: default_log_format(),
            stdout: true,
        }
    }
}

fn default_ssh_port() -> u16 {
    22
}

fn default_db_port() -> u16 {
    5432
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}

/// Seconds to wait for a connection when none is configured
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Treat empty strings from form-style input as absent
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl JobConfig {
    /// Parse a YAML job configuration and validate it
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: JobConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field that can be checked without touching the network
    pub fn validate(&self) -> Result<()> {
        self.ssh.validate()?;
        self.source_db.validate("source_db")?;
        self.target_db.validate("target_db")?;

        if self.tables.is_empty() {
            return Err(Error::ConfigError("tables must list at least one table".into()));
        }

        for table in &self.tables {
            table.validate()?;
        }

        if let Some(name) = naming::find_duplicate(self.tables.iter().map(|t| t.name.as_str())) {
            return Err(Error::ConfigError(format!("duplicate table name: {}", name)));
        }

        Ok(())
    }
}

impl SshConfig {
    /// Authentication methods to try, in order; a key is preferred over a password
    pub fn auth_methods(&self) -> Result<Vec<SshAuth>> {
        let mut methods = Vec::new();

        if let Some(path) = non_empty(&self.private_key_path) {
            methods.push(SshAuth::PrivateKey {
                path: path.to_string(),
                passphrase: non_empty(&self.private_key_passphrase).map(str::to_string),
            });
        }
        if let Some(password) = non_empty(&self.password) {
            methods.push(SshAuth::Password(password.to_string()));
        }

        if methods.is_empty() {
            return Err(Error::ConfigError(
                "ssh requires either private_key_path or password".into(),
            ));
        }

        Ok(methods)
    }

    /// Connection timeout for the SSH handshake
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS))
    }

    fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::ConfigError("ssh.host is required".into()));
        }
        if self.port == 0 {
            return Err(Error::ConfigError("ssh.port must be non-zero".into()));
        }
        if self.username.is_empty() {
            return Err(Error::ConfigError("ssh.username is required".into()));
        }
        self.auth_methods()?;
        Ok(())
    }
}

impl DatabaseConfig {
    /// Connection timeout for this database
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS))
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::ConfigError(format!("{}.host is required", section)));
        }
        if self.port == 0 {
            return Err(Error::ConfigError(format!("{}.port must be non-zero", section)));
        }
        if self.database.is_empty() {
            return Err(Error::ConfigError(format!("{}.database is required", section)));
        }
        if self.username.is_empty() {
            return Err(Error::ConfigError(format!("{}.username is required", section)));
        }
        Ok(())
    }
}

impl TableSpec {
    /// Create a spec that copies every column of a table unmasked
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            mask_rules: Vec::new(),
            column_types: Vec::new(),
        }
    }

    fn validate(&self) -> Result<()> {
        if !naming::is_valid_table_name(&self.name) {
            return Err(Error::ConfigError(format!("invalid table name: {:?}", self.name)));
        }

        if let Some(column) = self.columns.iter().find(|c| !naming::is_valid_identifier(c)) {
            return Err(Error::ConfigError(format!(
                "table {}: invalid column name {:?}",
                self.name, column
            )));
        }
        if let Some(column) = naming::find_duplicate(self.columns.iter().map(String::as_str)) {
            return Err(Error::ConfigError(format!(
                "table {}: column {} selected twice",
                self.name, column
            )));
        }

        for column in &self.column_types {
            if !naming::is_valid_identifier(&column.name) || column.data_type.trim().is_empty() {
                return Err(Error::ConfigError(format!(
                    "table {}: column_types entry {:?} needs a name and a data_type",
                    self.name, column.name
                )));
            }
        }
        if let Some(column) = naming::find_duplicate(self.column_types.iter().map(|c| c.name.as_str())) {
            return Err(Error::ConfigError(format!(
                "table {}: column_types lists {} twice",
                self.name, column
            )));
        }

        Ok(())
    }
}

impl fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("private_key_path", &self.private_key_path)
            .field("private_key_passphrase", &self.private_key_passphrase.as_ref().map(|_| "***"))
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("timeout_seconds", &self.timeout_seconds)
            .field("strict_host_key_checking", &self.strict_host_key_checking)
            .finish()
    }
}

impl fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SshAuth::PrivateKey { path, .. } => f.debug_struct("PrivateKey").field("path", path).finish(),
            SshAuth::Password(_) => f.write_str("Password(***)"),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}
