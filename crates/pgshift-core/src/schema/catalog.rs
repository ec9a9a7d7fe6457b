use serde::{Deserialize, Serialize};

use crate::sql::quote_ident;

/// Kind of a relation as reported by `information_schema.tables`.
///
/// The set is closed: a `table_type` outside it is a programming error and
/// must surface as [`PgShiftError::UnmappedCatalogKind`](crate::PgShiftError).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// Ordinary table (`BASE TABLE`).
    Regular,
    /// View (`VIEW`).
    View,
    /// Foreign table (`FOREIGN TABLE`).
    Foreign,
    /// Temporary table (`LOCAL TEMPORARY`).
    Temporary,
}

impl TableKind {
    /// Map an `information_schema.tables.table_type` value.
    ///
    /// Returns `None` for anything outside the closed set; callers turn that
    /// into a fatal error rather than guessing.
    pub fn from_table_type(table_type: &str) -> Option<Self> {
        match table_type {
            "BASE TABLE" => Some(TableKind::Regular),
            "VIEW" => Some(TableKind::View),
            "FOREIGN TABLE" => Some(TableKind::Foreign),
            "LOCAL TEMPORARY" => Some(TableKind::Temporary),
            _ => None,
        }
    }

    /// Single-letter code for this kind. Matches `pg_class.relkind` except
    /// for temporary tables, which the engine marks through `relpersistence`.
    pub fn code(&self) -> char {
        match self {
            TableKind::Regular => 'r',
            TableKind::View => 'v',
            TableKind::Foreign => 'f',
            TableKind::Temporary => 't',
        }
    }
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TableKind::Regular => "table",
            TableKind::View => "view",
            TableKind::Foreign => "foreign table",
            TableKind::Temporary => "temporary table",
        };
        write!(f, "{}", s)
    }
}

/// A relation found in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub kind: TableKind,
}

/// Shape of one column, from `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,
    /// Underlying type identifier (`udt_name`), e.g. `int4`, `varchar`.
    pub udt_name: String,
    /// Maximum character length for bounded character types.
    pub max_length: Option<i32>,
    /// Whether the column accepts NULL.
    pub nullable: bool,
}

/// A named table constraint and its readable definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintDescriptor {
    pub name: String,
    pub table: String,
    /// The stored comment when there is one, the DDL fragment otherwise.
    pub definition: String,
}

/// An index on a table. Index names are unique across the whole database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub table: String,
    /// Full `CREATE INDEX` statement as returned by `pg_indexes.indexdef`.
    pub definition: String,
    pub unique: bool,
}

impl IndexDescriptor {
    /// The key expressions, taken from the parenthesized tail of the definition.
    ///
    /// `CREATE INDEX i ON public.t USING btree (a, lower(b))` yields
    /// `["a", "lower(b)"]`. A trailing `WHERE` predicate is not included.
    pub fn expressions(&self) -> Vec<String> {
        let Some(open) = self.definition.find('(') else {
            return Vec::new();
        };

        let mut depth = 0usize;
        let mut items = Vec::new();
        let mut current = String::new();
        for c in self.definition[open + 1..].chars() {
            match c {
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' if depth == 0 => break,
                ')' => {
                    depth -= 1;
                    current.push(c);
                }
                ',' if depth == 0 => {
                    items.push(current.trim().to_string());
                    current.clear();
                }
                _ => current.push(c),
            }
        }
        if !current.trim().is_empty() {
            items.push(current.trim().to_string());
        }
        items
    }
}

/// A view whose definition reads a column, captured verbatim so it can be
/// recreated after the column changes type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDependency {
    pub schema: String,
    pub name: String,
    /// `SELECT` text as rendered by `pg_get_viewdef`, replayed as-is.
    pub definition: String,
}

impl ViewDependency {
    /// `"schema"."name"`, safe to splice into DDL.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }

    /// Statement recreating the view from its captured definition.
    pub fn create_sql(&self) -> String {
        let body = self.definition.trim().trim_end_matches(';').trim_end();
        format!("CREATE VIEW {} AS {}", self.qualified_name(), body)
    }
}

/// A column that must follow another one through a type change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_kind_mapping() {
        assert_eq!(TableKind::from_table_type("BASE TABLE"), Some(TableKind::Regular));
        assert_eq!(TableKind::from_table_type("VIEW"), Some(TableKind::View));
        assert_eq!(TableKind::from_table_type("FOREIGN TABLE"), Some(TableKind::Foreign));
        assert_eq!(
            TableKind::from_table_type("LOCAL TEMPORARY"),
            Some(TableKind::Temporary)
        );
        assert_eq!(TableKind::from_table_type("SYSTEM VIEW"), None);
        assert_eq!(TableKind::from_table_type("base table"), None);
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(TableKind::Regular.code(), 'r');
        assert_eq!(TableKind::View.code(), 'v');
        assert_eq!(TableKind::Foreign.code(), 'f');
        assert_eq!(TableKind::Temporary.code(), 't');
    }

    #[test]
    fn test_index_expressions() {
        let index = IndexDescriptor {
            name: "res_partner_name_idx".into(),
            table: "res_partner".into(),
            definition: "CREATE INDEX res_partner_name_idx ON public.res_partner USING btree (name, lower((email)::text)) WHERE active".into(),
            unique: false,
        };
        assert_eq!(
            index.expressions(),
            vec!["name".to_string(), "lower((email)::text)".to_string()]
        );
    }

    #[test]
    fn test_index_expressions_without_parens() {
        let index = IndexDescriptor {
            name: "x".into(),
            table: "t".into(),
            definition: String::new(),
            unique: true,
        };
        assert!(index.expressions().is_empty());
    }

    #[test]
    fn test_view_create_sql() {
        let view = ViewDependency {
            schema: "public".into(),
            name: "Partner Report".into(),
            definition: " SELECT p.id,\n    p.name\n   FROM res_partner p;".into(),
        };
        assert_eq!(view.qualified_name(), "\"public\".\"Partner Report\"");
        assert_eq!(
            view.create_sql(),
            "CREATE VIEW \"public\".\"Partner Report\" AS SELECT p.id,\n    p.name\n   FROM res_partner p"
        );
    }

    #[test]
    fn test_column_ref_display() {
        assert_eq!(ColumnRef::new("sale_order", "partner_id").to_string(), "sale_order.partner_id");
    }
}
