//! Utilities for db_copier
//!
//! Identifier handling and logging setup shared across the crate.

pub mod logging;
pub mod naming;

// Re-export key utility functions
pub use logging::init_logging;
pub use naming::{quote_identifier, quote_qualified};
