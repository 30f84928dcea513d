//! Schema module for db_copier
//!
//! This module handles target schema introspection and SQL generation.

pub mod generator;
pub mod introspector;
pub mod types;

// Re-export key types
pub use introspector::SchemaIntrospector;
pub use types::{CatalogColumn, Column, DefinitionSource, TableDefinition};
