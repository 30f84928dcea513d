//! Column masking
//!
//! Masks are applied to already-extracted rows after column projection and
//! before load. They never change the row count or the column set; a rule for
//! a column that was not extracted is skipped.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::MaskRule;
use crate::transfer::rows::{RowBatch, Value};

/// Character used for the hidden middle of a partially masked value
pub const MASK_CHAR: char = '*';

/// The closed set of masking transforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskMethod {
    /// Keep the first and last character, hide the rest
    Partial,
    /// Replace with a hex MD5 digest
    Hash,
    /// Replace with random alphanumerics of the same length
    Random,
}

impl MaskMethod {
    /// Mask a single string value
    pub fn apply(self, value: &str) -> String {
        match self {
            MaskMethod::Partial => partial(value),
            MaskMethod::Hash => hash(value),
            MaskMethod::Random => random(value),
        }
    }
}

/// First char, `len - 2` mask chars, last char; values of two chars or fewer pass through
pub fn partial(value: &str) -> String {
    let len = value.chars().count();
    if len <= 2 {
        return value.to_string();
    }

    let mut chars = value.chars();
    let first = chars.next().unwrap_or_default();
    let last = chars.next_back().unwrap_or_default();

    let mut masked = String::with_capacity(value.len());
    masked.push(first);
    masked.extend(std::iter::repeat(MASK_CHAR).take(len - 2));
    masked.push(last);
    masked
}

/// Deterministic 32-character digest
pub fn hash(value: &str) -> String {
    format!("{:x}", md5::compute(value.as_bytes()))
}

/// Fresh alphanumeric string with the same number of characters
pub fn random(value: &str) -> String {
    let len = value.chars().count();
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Apply rules in order; values are coerced to text, masked and written back as text
pub fn apply(mut batch: RowBatch, rules: &[MaskRule]) -> RowBatch {
    for rule in rules {
        if !batch.has_column(&rule.column) {
            tracing::debug!(column = %rule.column, "Mask rule column not extracted, skipping");
            continue;
        }

        let method = rule.method;
        batch.map_column(&rule.column, |value| match value.to_text() {
            Some(text) => Value::Text(method.apply(&text)),
            None => Value::Null,
        });
    }

    batch
}
