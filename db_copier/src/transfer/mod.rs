//! Row transfer
//!
//! The row model and the per-table pipeline that moves rows from source to target.

pub mod pipeline;
pub mod rows;

pub use pipeline::{TableCopyPipeline, TableCopyResult, LOAD_CHUNK_ROWS};
pub use rows::{Record, RowBatch, Value};
