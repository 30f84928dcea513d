//! Identifier utilities
//!
//! Table and column names come straight from job configuration, so every name
//! that reaches SQL text goes through the quoting helpers in this module.

use std::collections::HashSet;

/// Longest identifier PostgreSQL keeps without truncation
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Quote a single identifier, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Split `schema.table` into its parts; a bare name has no schema
pub fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((schema, table)) => (Some(schema), table),
        None => (None, name),
    }
}

/// Quote a possibly schema-qualified table name
pub fn quote_qualified(name: &str) -> String {
    match split_qualified(name) {
        (Some(schema), table) => format!("{}.{}", quote_identifier(schema), quote_identifier(table)),
        (None, table) => quote_identifier(table),
    }
}

/// Check that a name can be used as an identifier
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_IDENTIFIER_LENGTH
        && !name.contains('\0')
        && name.trim() == name
}

/// Check a table name, allowing one level of schema qualification
pub fn is_valid_table_name(name: &str) -> bool {
    match split_qualified(name) {
        (Some(schema), table) => is_valid_identifier(schema) && is_valid_identifier(table),
        (None, table) => is_valid_identifier(table),
    }
}

/// Return the first name that appears more than once
pub fn find_duplicate<'a, I>(names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();

    for name in names {
        if !seen.insert(name) {
            return Some(name);
        }
    }

    None
}

/// Join quoted identifiers into a column list
pub fn column_list<'a, I>(names: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("odd\"name"), "\"odd\"\"name\"");
        assert_eq!(quote_identifier("Mixed Case"), "\"Mixed Case\"");
    }

    #[test]
    fn test_quote_qualified() {
        assert_eq!(quote_qualified("public.users"), "\"public\".\"users\"");
        assert_eq!(quote_qualified("users"), "\"users\"");
    }

    #[test]
    fn test_split_qualified() {
        assert_eq!(split_qualified("sales.orders"), (Some("sales"), "orders"));
        assert_eq!(split_qualified("orders"), (None, "orders"));
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("email"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier(" email"));
        assert!(!is_valid_identifier("bad\0name"));
        assert!(!is_valid_identifier(&"x".repeat(MAX_IDENTIFIER_LENGTH + 1)));

        assert!(is_valid_table_name("public.users"));
        assert!(!is_valid_table_name("public."));
        assert!(!is_valid_table_name(".users"));
    }

    #[test]
    fn test_find_duplicate() {
        let names = vec!["users", "orders", "users"];
        assert_eq!(find_duplicate(names), Some("users"));

        let names = vec!["users", "Users"];
        assert_eq!(find_duplicate(names), None);
    }

    #[test]
    fn test_column_list() {
        assert_eq!(column_list(["id", "email"]), "\"id\", \"email\"");
    }
}
