//! Error types for db_copier

use std::fmt;

use thiserror::Error;

/// Result type for db_copier operations
pub type Result<T> = std::result::Result<T, Error>;

/// The step of a table copy an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Describe,
    Recreate,
    Extract,
    Mask,
    Load,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Describe => "describe",
            Phase::Recreate => "recreate",
            Phase::Extract => "extract",
            Phase::Mask => "mask",
            Phase::Load => "load",
        };
        f.write_str(name)
    }
}

/// Error types for db_copier
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connectivity error: {0}")]
    ConnectivityError(String),

    #[error("Schema error on table {table} during {phase}: {message}")]
    SchemaError {
        table: String,
        phase: Phase,
        message: String,
    },

    #[error("Transfer error on table {table} during {phase}: {message}")]
    TransferError {
        table: String,
        phase: Phase,
        message: String,
    },

    #[error("Job cancelled before table {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Build a schema error for a table
    pub fn schema(table: impl Into<String>, phase: Phase, message: impl fmt::Display) -> Self {
        Error::SchemaError {
            table: table.into(),
            phase,
            message: message.to_string(),
        }
    }

    /// Build a transfer error for a table
    pub fn transfer(table: impl Into<String>, phase: Phase, message: impl fmt::Display) -> Self {
        Error::TransferError {
            table: table.into(),
            phase,
            message: message.to_string(),
        }
    }

    /// Wrap any displayable cause as a connectivity failure
    pub fn connectivity(context: &str, cause: impl fmt::Display) -> Self {
        Error::ConnectivityError(format!("{}: {}", context, cause))
    }
}

/// Convert Serde JSON errors to db_copier errors
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert YAML errors to configuration errors
impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Error::ConfigError(error.to_string())
    }
}

/// Convert TOML deserialization errors to configuration errors
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::ConfigError(error.to_string())
    }
}
