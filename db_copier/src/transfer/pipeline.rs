//! Per-table copy pipeline
//!
//! For one table, strictly in order: extract the projection from the source,
//! mask it, resolve the target definition, drop and recreate the target table,
//! then bulk-load the masked rows in fixed-size chunks and commit once.
//!
//! Extraction materialises the whole result set in memory before anything is
//! written. Very large tables are bounded by available memory.

use serde::Serialize;
use std::time::Instant;

use crate::config::TableSpec;
use crate::db::Store;
use crate::error::{Error, Phase, Result};
use crate::masking;
use crate::schema::introspector::SchemaIntrospector;

/// Rows per insert statement during load
pub const LOAD_CHUNK_ROWS: usize = 1000;

/// Outcome of one table copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCopyResult {
    pub table: String,
    pub rows_copied: u64,
    pub duration_ms: u64,
}

/// Copies tables from a source store into a target store
pub struct TableCopyPipeline<'a, S: Store> {
    source: &'a mut S,
    target: &'a mut S,
}

impl<'a, S: Store> TableCopyPipeline<'a, S> {
    pub fn new(source: &'a mut S, target: &'a mut S) -> Self {
        Self { source, target }
    }

    /// Copy one table; any failure aborts this table and is returned with its phase
    pub async fn copy_table(&mut self, spec: &TableSpec) -> Result<TableCopyResult> {
        let started = Instant::now();
        let table = spec.name.as_str();
        tracing::info!(table, "Copying table");

        let batch = self
            .source
            .fetch_rows(table, &spec.columns)
            .await
            .map_err(|e| Error::transfer(table, Phase::Extract, e))?;
        tracing::info!(table, rows = batch.len(), columns = batch.columns().len(), "Extracted rows");

        let batch = masking::apply(batch, &spec.mask_rules);

        let definition = SchemaIntrospector::new(&mut *self.target)
            .describe(table, &spec.column_types)
            .await?;

        // Checked before the drop so a mismatch leaves the target untouched
        let missing = definition.missing_columns(batch.columns());
        if !missing.is_empty() {
            return Err(Error::schema(
                table,
                Phase::Describe,
                format!("extracted columns not in target definition: {}", missing.join(", ")),
            ));
        }

        self.target
            .recreate_table(&definition)
            .await
            .map_err(|e| Error::schema(table, Phase::Recreate, e))?;
        tracing::info!(table, source = ?definition.source, "Recreated target table");

        let rows_copied = self
            .target
            .load_rows(&definition, &batch, LOAD_CHUNK_ROWS)
            .await
            .map_err(|e| Error::transfer(table, Phase::Load, e))?;

        if rows_copied != batch.len() as u64 {
            return Err(Error::transfer(
                table,
                Phase::Load,
                format!("loaded {} rows but extracted {}", rows_copied, batch.len()),
            ));
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(table, rows = rows_copied, duration_ms, "Table copied");

        Ok(TableCopyResult {
            table: table.to_string(),
            rows_copied,
            duration_ms,
        })
    }
}
