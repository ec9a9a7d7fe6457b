//! SQL text helpers shared by the inspector, the mutator and callers.

use crate::error::{PgShiftError, Result};

/// Quote a PostgreSQL identifier.
/// Doubles double quotes: `Table"Name` -> `"Table""Name"`
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for statements that cannot take bind parameters
/// (`COMMENT ON ... IS`). Doubles single quotes: `O'Brien` -> `'O''Brien'`
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Escape `\`, `%` and `_` so a value can be embedded in a LIKE pattern.
pub fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// VARCHAR declaration for the given size.
///
/// No size, zero or a negative size gives the unbounded `VARCHAR`.
pub fn pg_varchar(size: Option<i64>) -> String {
    match size {
        Some(n) if n > 0 => format!("VARCHAR({})", n),
        _ => "VARCHAR".to_string(),
    }
}

/// Same as [`pg_varchar`] for a size that arrives as text (plans, CLI).
///
/// An empty string counts as no size; anything else must be an integer.
pub fn pg_varchar_str(size: &str) -> Result<String> {
    let size = size.trim();
    if size.is_empty() {
        return Ok(pg_varchar(None));
    }
    let n = size.parse::<i64>().map_err(|_| {
        PgShiftError::InvalidArgument(format!("VARCHAR parameter should be an int, got {:?}", size))
    })?;
    Ok(pg_varchar(Some(n)))
}

/// Reverse an ORDER BY clause: `a asc, b desc` -> `a desc, b asc`.
///
/// Terms without an explicit direction are ascending, so they become `desc`.
/// Output is lower-cased.
pub fn reverse_order(order: &str) -> String {
    order
        .split(',')
        .filter_map(|item| {
            let item = item.to_lowercase();
            let mut words = item.split_whitespace();
            let column = words.next()?.to_string();
            let rest: Vec<&str> = words.collect();
            let direction = if rest == ["desc"] { "asc" } else { "desc" };
            Some(format!("{} {}", column, direction))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Whether a type identifier names the 64-bit integer type.
pub fn is_int8(sql_type: &str) -> bool {
    matches!(
        sql_type.trim().to_ascii_lowercase().as_str(),
        "int8" | "bigint"
    )
}

/// Whether a type identifier names the 32-bit integer type.
pub fn is_int4(sql_type: &str) -> bool {
    matches!(
        sql_type.trim().to_ascii_lowercase().as_str(),
        "int4" | "integer" | "int"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("res_partner"), "\"res_partner\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
        assert_eq!(quote_literal("CHECK(x > 0)"), "'CHECK(x > 0)'");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_pg_varchar() {
        assert_eq!(pg_varchar(None), "VARCHAR");
        assert_eq!(pg_varchar(Some(0)), "VARCHAR");
        assert_eq!(pg_varchar(Some(-1)), "VARCHAR");
        assert_eq!(pg_varchar(Some(10)), "VARCHAR(10)");
    }

    #[test]
    fn test_pg_varchar_str() {
        assert_eq!(pg_varchar_str("").unwrap(), "VARCHAR");
        assert_eq!(pg_varchar_str("0").unwrap(), "VARCHAR");
        assert_eq!(pg_varchar_str("64").unwrap(), "VARCHAR(64)");
        assert!(matches!(
            pg_varchar_str("12.5"),
            Err(PgShiftError::InvalidArgument(_))
        ));
        assert!(pg_varchar_str("ten").is_err());
    }

    #[test]
    fn test_reverse_order() {
        assert_eq!(reverse_order("a asc, b desc"), "a desc, b asc");
        assert_eq!(reverse_order("A ASC, B DESC"), "a desc, b asc");
        assert_eq!(reverse_order("id"), "id desc");
        assert_eq!(reverse_order("name desc,id"), "name asc, id desc");
    }

    #[test]
    fn test_reverse_order_skips_empty_terms() {
        assert_eq!(reverse_order("a desc, "), "a asc");
        assert_eq!(reverse_order(""), "");
    }

    #[test]
    fn test_integer_type_names() {
        assert!(is_int8("int8"));
        assert!(is_int8("BIGINT"));
        assert!(!is_int8("int4"));
        assert!(is_int4("int4"));
        assert!(is_int4("INTEGER"));
        assert!(!is_int4("numeric"));
    }
}
