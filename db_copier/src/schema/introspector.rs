//! Target schema introspection
//!
//! The target table is recreated from the target engine's own catalog entry
//! for the table. Types are never inferred from the source; when the catalog
//! has no entry the job configuration must supply `column_types`.

use crate::db::Store;
use crate::error::{Error, Phase, Result};
use crate::schema::types::{CatalogColumn, Column, DefinitionSource, TableDefinition};
use crate::utils::naming::quote_identifier;

/// Reads table definitions from a store's catalog
pub struct SchemaIntrospector<'a, S: Store + ?Sized> {
    store: &'a mut S,
}

impl<'a, S: Store + ?Sized> SchemaIntrospector<'a, S> {
    /// Create a new introspector over a connection
    pub fn new(store: &'a mut S) -> Self {
        Self { store }
    }

    /// Describe a table, falling back to configured columns when it does not exist
    pub async fn describe(&mut self, table: &str, fallback: &[Column]) -> Result<TableDefinition> {
        let entries = self
            .store
            .catalog_columns(table)
            .await
            .map_err(|e| Error::schema(table, Phase::Describe, e))?;

        if !entries.is_empty() {
            tracing::debug!(table, columns = entries.len(), "Using catalog definition");
            return Ok(TableDefinition {
                name: table.to_string(),
                columns: entries.iter().map(catalog_to_column).collect(),
                source: DefinitionSource::Catalog,
            });
        }

        if !fallback.is_empty() {
            tracing::info!(table, "Table not in target catalog, using configured column_types");
            return Ok(TableDefinition {
                name: table.to_string(),
                columns: fallback.to_vec(),
                source: DefinitionSource::Configured,
            });
        }

        Err(Error::schema(
            table,
            Phase::Describe,
            "table does not exist in the target and no column_types are configured",
        ))
    }
}

/// Convert a catalog entry to a column carrying its exact DDL type
pub fn catalog_to_column(entry: &CatalogColumn) -> Column {
    Column {
        name: entry.column_name.clone(),
        data_type: entry.data_type.clone(),
        nullable: !entry.not_null,
        cast_as: Some(format!(
            "{}.{}",
            quote_identifier(&entry.type_schema),
            quote_identifier(&entry.type_name)
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::schema::types::TableDefinition;
    use crate::transfer::rows::RowBatch;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct CatalogOnly(Vec<CatalogColumn>);

    #[async_trait]
    impl Store for CatalogOnly {
        async fn fetch_rows(&mut self, _table: &str, _columns: &[String]) -> Result<RowBatch> {
            Ok(RowBatch::default())
        }

        async fn catalog_columns(&mut self, _table: &str) -> Result<Vec<CatalogColumn>> {
            Ok(self.0.clone())
        }

        async fn recreate_table(&mut self, _definition: &TableDefinition) -> Result<()> {
            Ok(())
        }

        async fn load_rows(&mut self, _definition: &TableDefinition, batch: &RowBatch, _chunk_rows: usize) -> Result<u64> {
            Ok(batch.len() as u64)
        }

        async fn ping(&mut self) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn entry(name: &str, data_type: &str, type_name: &str) -> CatalogColumn {
        CatalogColumn {
            type_name: type_name.to_string(),
            ..CatalogColumn::simple(name, data_type)
        }
    }

    #[test]
    fn test_modifiers_survive_into_definition() {
        let cases = [
            entry("flags", "bit(8)", "bit"),
            entry("seen_at", "timestamp(0) with time zone", "timestamptz"),
            entry("codes", "character varying(4)[]", "_varchar"),
            entry("price", "numeric(10,2)", "numeric"),
        ];

        let rendered: Vec<String> = cases.iter().map(|c| catalog_to_column(c).data_type).collect();
        assert_eq!(
            rendered,
            vec![
                "bit(8)",
                "timestamp(0) with time zone",
                "character varying(4)[]",
                "numeric(10,2)",
            ]
        );
    }

    #[test]
    fn test_cast_drops_modifiers() {
        let column = catalog_to_column(&entry("flags", "bit(8)", "bit"));
        assert_eq!(column.cast_as.as_deref(), Some("\"pg_catalog\".\"bit\""));

        let mood = CatalogColumn {
            type_schema: "app".to_string(),
            ..entry("mood", "app.mood", "mood")
        };
        assert_eq!(catalog_to_column(&mood).cast_as.as_deref(), Some("\"app\".\"mood\""));
    }

    #[test]
    fn test_nullability() {
        let mut column = entry("id", "integer", "int4");
        column.not_null = true;
        assert!(!catalog_to_column(&column).nullable);
    }

    #[tokio::test]
    async fn test_catalog_wins_over_fallback() {
        let mut store = CatalogOnly(vec![entry("flags", "bit(8)", "bit")]);
        let fallback = vec![Column::new("flags", "bit")];

        let definition = SchemaIntrospector::new(&mut store)
            .describe("users", &fallback)
            .await
            .unwrap();

        assert_eq!(definition.source, DefinitionSource::Catalog);
        assert_eq!(definition.columns[0].data_type, "bit(8)");
    }

    #[tokio::test]
    async fn test_no_catalog_and_no_fallback_is_schema_error() {
        let mut store = CatalogOnly(Vec::new());

        let err = SchemaIntrospector::new(&mut store).describe("users", &[]).await.unwrap_err();

        assert!(matches!(err, Error::SchemaError { phase: Phase::Describe, .. }));
    }
}
