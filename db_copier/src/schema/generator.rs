//! SQL generation
//!
//! This module renders the projection query, the drop-and-recreate DDL and
//! the insert statement prefix used by the loader.

use crate::schema::types::{Column, TableDefinition};
use crate::utils::naming::{column_list, quote_identifier, quote_qualified};

/// PostgreSQL's limit on bind parameters in one statement
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Generate the projection query for a table; no columns selects all
pub fn select_sql(table: &str, columns: &[String]) -> String {
    let projection = if columns.is_empty() {
        "*".to_string()
    } else {
        column_list(columns.iter().map(String::as_str))
    };

    format!("SELECT {} FROM {}", projection, quote_qualified(table))
}

/// Generate SQL to drop a table if it exists
pub fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_qualified(table))
}

/// Generate SQL to create a table from a definition
pub fn create_table_sql(definition: &TableDefinition) -> String {
    let column_defs: Vec<String> = definition
        .columns
        .iter()
        .map(|column| {
            let nullable = if column.nullable { "" } else { " NOT NULL" };
            format!("  {} {}{}", quote_identifier(&column.name), column.data_type, nullable)
        })
        .collect();

    format!(
        "CREATE TABLE {} (\n{}\n)",
        quote_qualified(&definition.name),
        column_defs.join(",\n")
    )
}

/// Generate the `INSERT INTO t (cols) ` prefix for a multi-row insert
pub fn insert_prefix(table: &str, columns: &[String]) -> String {
    format!(
        "INSERT INTO {} ({}) ",
        quote_qualified(table),
        column_list(columns.iter().map(String::as_str))
    )
}

/// Type a loaded value is cast to before insert
///
/// The cast never carries a length or precision: an explicit cast to
/// `varchar(n)` or `bit(n)` silently truncates, while the insert's own
/// assignment to the column rejects a value that does not fit.
pub fn cast_type(column: &Column) -> String {
    match &column.cast_as {
        Some(cast) => cast.clone(),
        None => unmodified_type(&column.data_type),
    }
}

/// Strip type modifiers from a configured type name
fn unmodified_type(data_type: &str) -> String {
    let mut base = String::with_capacity(data_type.len());
    let mut depth = 0usize;
    for ch in data_type.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => base.push(ch),
            _ => {}
        }
    }

    let base = base.split_whitespace().collect::<Vec<_>>().join(" ");
    let (name, array) = match base.strip_suffix("[]") {
        Some(name) => (name.trim_end(), "[]"),
        None => (base.as_str(), ""),
    };

    // Without a modifier these names mean length one
    let name = match name.to_ascii_lowercase().as_str() {
        "bit" => "varbit".to_string(),
        "char" | "character" => "bpchar".to_string(),
        _ => name.to_string(),
    };

    format!("{}{}", name, array)
}

/// Rows per insert statement, capped so the statement stays under the bind limit
pub fn rows_per_statement(chunk_rows: usize, column_count: usize) -> usize {
    if column_count == 0 {
        return chunk_rows.max(1);
    }
    chunk_rows.min(MAX_BIND_PARAMS / column_count).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{Column, DefinitionSource};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_select_all_columns() {
        assert_eq!(select_sql("users", &[]), "SELECT * FROM \"users\"");
    }

    #[test]
    fn test_select_projection() {
        let columns = vec!["id".to_string(), "email".to_string()];
        assert_eq!(
            select_sql("public.users", &columns),
            "SELECT \"id\", \"email\" FROM \"public\".\"users\""
        );
    }

    #[test]
    fn test_create_table_sql() {
        let definition = TableDefinition {
            name: "users".to_string(),
            columns: vec![
                Column::new("id", "integer").nullable(false),
                Column::new("email", "varchar(255)"),
            ],
            source: DefinitionSource::Catalog,
        };

        assert_eq!(
            create_table_sql(&definition),
            "CREATE TABLE \"users\" (\n  \"id\" integer NOT NULL,\n  \"email\" varchar(255)\n)"
        );
        assert_eq!(drop_table_sql("users"), "DROP TABLE IF EXISTS \"users\"");
    }

    #[test]
    fn test_insert_prefix() {
        let columns = vec!["id".to_string(), "email".to_string()];
        assert_eq!(
            insert_prefix("users", &columns),
            "INSERT INTO \"users\" (\"id\", \"email\") "
        );
    }

    #[test]
    fn test_cast_type_has_no_modifiers() {
        let cases = [
            ("varchar(12)", "varchar"),
            ("character varying(12)", "character varying"),
            ("bit(8)", "varbit"),
            ("bit(8)[]", "varbit[]"),
            ("character(3)", "bpchar"),
            ("timestamp(0) with time zone", "timestamp with time zone"),
            ("numeric(10,2)", "numeric"),
            ("character varying(4)[]", "character varying[]"),
            ("integer", "integer"),
        ];

        for (data_type, expected) in cases {
            assert_eq!(cast_type(&Column::new("c", data_type)), expected, "{}", data_type);
        }
    }

    #[test]
    fn test_catalog_cast_is_preferred() {
        let column = Column {
            cast_as: Some("\"pg_catalog\".\"bit\"".to_string()),
            ..Column::new("flags", "bit(8)")
        };
        assert_eq!(cast_type(&column), "\"pg_catalog\".\"bit\"");
    }

    #[test]
    fn test_create_table_keeps_modifiers() {
        let definition = TableDefinition {
            name: "users".to_string(),
            columns: vec![
                Column::new("flags", "bit(8)"),
                Column::new("seen_at", "timestamp(0) with time zone"),
            ],
            source: DefinitionSource::Catalog,
        };

        assert_eq!(
            create_table_sql(&definition),
            "CREATE TABLE \"users\" (\n  \"flags\" bit(8),\n  \"seen_at\" timestamp(0) with time zone\n)"
        );
    }

    #[test]
    fn test_rows_per_statement_respects_bind_limit() {
        assert_eq!(rows_per_statement(1000, 2), 1000);
        assert_eq!(rows_per_statement(1000, 100), 655);
        assert_eq!(rows_per_statement(1000, 70_000), 1);
    }
}
