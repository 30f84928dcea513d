//! Type definitions for table schema objects

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A column of a table definition, as read from the catalog or configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Full type as written in DDL, modifiers included (`varchar(12)`, `bit(8)`)
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Unmodified type that loaded values are cast to; derived from `data_type` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cast_as: Option<String>,
}

fn default_nullable() -> bool {
    true
}

impl Column {
    /// Create a new nullable column with the given name and type
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            cast_as: None,
        }
    }

    /// Set whether the column is nullable
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// A column entry read from `pg_attribute`
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CatalogColumn {
    pub column_name: String,
    /// `format_type(atttypid, atttypmod)`
    pub data_type: String,
    /// Schema and internal name of the column's type, without modifiers
    pub type_schema: String,
    pub type_name: String,
    pub not_null: bool,
}

impl CatalogColumn {
    /// A nullable entry of a built-in type
    pub fn simple(name: &str, data_type: &str) -> Self {
        Self {
            column_name: name.to_string(),
            data_type: data_type.to_string(),
            type_schema: "pg_catalog".to_string(),
            type_name: data_type.to_string(),
            not_null: false,
        }
    }
}

/// Where a table definition came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionSource {
    /// The target engine's own catalog entry
    Catalog,
    /// Explicit `column_types` from the job configuration
    Configured,
}

/// The definition a target table is recreated from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<Column>,
    pub source: DefinitionSource,
}

impl TableDefinition {
    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of the extracted columns that have no counterpart in this definition
    pub fn missing_columns<'a>(&self, extracted: &'a [String]) -> Vec<&'a str> {
        extracted
            .iter()
            .filter(|name| self.column(name).is_none())
            .map(String::as_str)
            .collect()
    }
}
