//! Read-only catalog queries.
//!
//! Every call reads the catalog fresh; nothing is cached, so answers always
//! reflect the DDL already issued in the current transaction.

use std::collections::{BTreeMap, HashSet};

use pgshift_core::error::{PgShiftError, Result};
use pgshift_core::schema::{
    ColumnDescriptor, ColumnRef, ConstraintDescriptor, ExistingForeignKey, IndexDescriptor,
    OnDelete, TableDescriptor, TableKind, ViewDependency,
};

use crate::db::Cursor;

/// Answers existence and shape questions about schema objects.
#[derive(Debug, Clone)]
pub struct CatalogInspector {
    schema: String,
}

impl Default for CatalogInspector {
    fn default() -> Self {
        Self::new("public")
    }
}

impl CatalogInspector {
    /// Inspector scoped to the given primary schema.
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Names among `names` that exist as tables, views or materialized views
    /// in the primary schema.
    pub async fn existing_tables(
        &self,
        cur: &mut Cursor<'_>,
        names: &[&str],
    ) -> Result<HashSet<String>> {
        if names.is_empty() {
            return Ok(HashSet::new());
        }
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();

        let rows: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT c.relname::text
              FROM pg_class c
              JOIN pg_namespace n ON (n.oid = c.relnamespace)
             WHERE c.relname = ANY($1)
               AND c.relkind IN ('r', 'v', 'm')
               AND n.nspname = $2
            "#,
        )
        .bind(&names)
        .bind(&self.schema)
        .fetch_all(cur.conn())
        .await?;

        Ok(rows.into_iter().collect())
    }

    pub async fn table_exists(&self, cur: &mut Cursor<'_>, table: &str) -> Result<bool> {
        Ok(self.existing_tables(cur, &[table]).await?.contains(table))
    }

    /// Kind of the named relation, or `None` if it does not exist.
    ///
    /// A temporary table shadows a regular one of the same name, as it does
    /// on the search path. A `table_type` outside [`TableKind`] is fatal.
    pub async fn table_kind(&self, cur: &mut Cursor<'_>, table: &str) -> Result<Option<TableKind>> {
        let table_type: Option<String> = sqlx::query_scalar(
            r#"
            SELECT table_type::text
              FROM information_schema.tables
             WHERE table_name = $1
               AND table_schema IN ($2, pg_my_temp_schema()::regnamespace::text)
             ORDER BY (table_type = 'LOCAL TEMPORARY') DESC
             LIMIT 1
            "#,
        )
        .bind(table)
        .bind(&self.schema)
        .fetch_optional(cur.conn())
        .await?;

        match table_type {
            None => Ok(None),
            Some(kind) => TableKind::from_table_type(&kind)
                .map(Some)
                .ok_or_else(|| PgShiftError::UnmappedCatalogKind {
                    relation: table.to_string(),
                    kind,
                }),
        }
    }

    /// Name and kind of a relation, or `None` if it does not exist.
    pub async fn describe_table(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
    ) -> Result<Option<TableDescriptor>> {
        Ok(self
            .table_kind(cur, table)
            .await?
            .map(|kind| TableDescriptor {
                name: table.to_string(),
                kind,
            }))
    }

    /// Columns of a table keyed by name.
    pub async fn columns_of(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
    ) -> Result<BTreeMap<String, ColumnDescriptor>> {
        // character_octet_length is left out on purpose: shared hosts often
        // revoke it from application roles.
        let rows: Vec<(String, String, Option<i32>, String)> = sqlx::query_as(
            r#"
            SELECT column_name::text,
                   udt_name::text,
                   character_maximum_length::int4,
                   is_nullable::text
              FROM information_schema.columns
             WHERE table_name = $1
               AND table_schema IN ($2, pg_my_temp_schema()::regnamespace::text)
             ORDER BY ordinal_position
            "#,
        )
        .bind(table)
        .bind(&self.schema)
        .fetch_all(cur.conn())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, udt_name, max_length, is_nullable)| {
                let column = ColumnDescriptor {
                    name: name.clone(),
                    udt_name,
                    max_length,
                    nullable: is_nullable == "YES",
                };
                (name, column)
            })
            .collect())
    }

    /// `udt_name` of a column, e.g. `int4`, or `None` if it does not exist.
    pub async fn column_type(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
        column: &str,
    ) -> Result<Option<String>> {
        let udt: Option<String> = sqlx::query_scalar(
            r#"
            SELECT udt_name::text
              FROM information_schema.columns
             WHERE table_name = $1
               AND column_name = $2
               AND table_schema IN ($3, pg_my_temp_schema()::regnamespace::text)
             LIMIT 1
            "#,
        )
        .bind(table)
        .bind(column)
        .bind(&self.schema)
        .fetch_optional(cur.conn())
        .await?;

        Ok(udt)
    }

    pub async fn column_exists(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
        column: &str,
    ) -> Result<bool> {
        Ok(self.column_type(cur, table, column).await?.is_some())
    }

    /// Readable definition of a constraint: the comment stored by
    /// `add_constraint` when present, the engine's DDL rendering otherwise.
    pub async fn constraint_definition(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
        constraint: &str,
    ) -> Result<Option<String>> {
        let definition: Option<String> = sqlx::query_scalar(
            r#"
            SELECT COALESCE(d.description, pg_get_constraintdef(c.oid))
              FROM pg_constraint c
              JOIN pg_class t ON t.oid = c.conrelid
              JOIN pg_namespace n ON n.oid = t.relnamespace
              LEFT JOIN pg_description d
                     ON d.objoid = c.oid AND d.classoid = 'pg_constraint'::regclass
             WHERE t.relname = $1
               AND c.conname = $2
               AND (n.nspname = $3 OR n.oid = pg_my_temp_schema())
             LIMIT 1
            "#,
        )
        .bind(table)
        .bind(constraint)
        .bind(&self.schema)
        .fetch_optional(cur.conn())
        .await?;

        Ok(definition)
    }

    /// All constraints of a table, ordered by name.
    pub async fn constraints_of(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
    ) -> Result<Vec<ConstraintDescriptor>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT c.conname::text, COALESCE(d.description, pg_get_constraintdef(c.oid))
              FROM pg_constraint c
              JOIN pg_class t ON t.oid = c.conrelid
              JOIN pg_namespace n ON n.oid = t.relnamespace
              LEFT JOIN pg_description d
                     ON d.objoid = c.oid AND d.classoid = 'pg_constraint'::regclass
             WHERE t.relname = $1
               AND (n.nspname = $2 OR n.oid = pg_my_temp_schema())
             ORDER BY c.conname
            "#,
        )
        .bind(table)
        .bind(&self.schema)
        .fetch_all(cur.conn())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, definition)| ConstraintDescriptor {
                name,
                table: table.to_string(),
                definition,
            })
            .collect())
    }

    /// Whether an index of that name exists anywhere in the database.
    pub async fn index_exists(&self, cur: &mut Cursor<'_>, index: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_indexes WHERE indexname = $1)")
                .bind(index)
                .fetch_one(cur.conn())
                .await?;
        Ok(exists)
    }

    /// Indexes whose key includes the column.
    ///
    /// Indexes backing a constraint are left out: they go away with the
    /// constraint and must not be dropped separately.
    pub async fn indexes_on_column(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
        column: &str,
    ) -> Result<HashSet<IndexDescriptor>> {
        let rows: Vec<(String, String, String, bool)> = sqlx::query_as(
            r#"
            SELECT tbl.relname::text,
                   pgis.indexname::text,
                   pgis.indexdef,
                   pgi.indisunique
              FROM pg_class tbl
              JOIN pg_index pgi ON pgi.indrelid = tbl.oid
              JOIN pg_class idx ON pgi.indexrelid = idx.oid
              JOIN pg_attribute pga ON pga.attrelid = tbl.oid
              JOIN pg_indexes pgis ON pgis.indexname = idx.relname
                                  AND pgis.tablename = tbl.relname
             WHERE tbl.relkind = 'r'
               AND pga.attname = $1
               AND pga.attnum = ANY(pgi.indkey)
               AND tbl.relname = $2
               AND pgis.schemaname = $3
               AND NOT EXISTS (
                   SELECT 1 FROM pg_constraint WHERE conindid = pgi.indexrelid
               )
            "#,
        )
        .bind(column)
        .bind(table)
        .bind(&self.schema)
        .fetch_all(cur.conn())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(table, name, definition, unique)| IndexDescriptor {
                name,
                table,
                definition,
                unique,
            })
            .collect())
    }

    /// Columns holding a foreign key to `(table, column)`, ordered by table
    /// then column. Composite keys contribute the column paired with `column`.
    /// Referencing tables outside the inspected schema are left out.
    pub async fn foreign_keys_referencing(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
        column: &str,
    ) -> Result<Vec<ColumnRef>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT DISTINCT src.relname::text, sa.attname::text
              FROM pg_constraint con
             CROSS JOIN LATERAL unnest(con.conkey, con.confkey) AS k(src_attnum, dst_attnum)
              JOIN pg_class src ON src.oid = con.conrelid
              JOIN pg_class dst ON dst.oid = con.confrelid
              JOIN pg_namespace n ON n.oid = dst.relnamespace
              JOIN pg_namespace sn ON sn.oid = src.relnamespace
              JOIN pg_attribute sa ON sa.attrelid = con.conrelid AND sa.attnum = k.src_attnum
              JOIN pg_attribute da ON da.attrelid = con.confrelid AND da.attnum = k.dst_attnum
             WHERE con.contype = 'f'
               AND dst.relname = $1
               AND da.attname = $2
               AND n.nspname = $3
               AND sn.nspname = $3
             ORDER BY 1, 2
            "#,
        )
        .bind(table)
        .bind(column)
        .bind(&self.schema)
        .fetch_all(cur.conn())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(table, column)| ColumnRef { table, column })
            .collect())
    }

    /// Single-column foreign keys declared on `(table, column)`, ordered by
    /// constraint name.
    ///
    /// Reads `pg_constraint` directly; the `information_schema` equivalents
    /// are far slower on databases with thousands of constraints.
    pub async fn foreign_keys_from(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
        column: &str,
    ) -> Result<Vec<ExistingForeignKey>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT con.conname::text, c2.relname::text, a2.attname::text, con.confdeltype::text
              FROM pg_constraint AS con
              JOIN pg_class AS c1 ON c1.oid = con.conrelid
              JOIN pg_class AS c2 ON c2.oid = con.confrelid
              JOIN pg_namespace AS n ON n.oid = c1.relnamespace
              JOIN pg_attribute AS a1 ON a1.attrelid = c1.oid AND a1.attnum = con.conkey[1]
              JOIN pg_attribute AS a2 ON a2.attrelid = c2.oid AND a2.attnum = con.confkey[1]
             WHERE con.contype = 'f'
               AND array_length(con.conkey, 1) = 1
               AND c1.relname = $1
               AND a1.attname = $2
               AND n.nspname = $3
             ORDER BY con.conname
            "#,
        )
        .bind(table)
        .bind(column)
        .bind(&self.schema)
        .fetch_all(cur.conn())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, target_table, target_column, deltype)| ExistingForeignKey {
                name,
                target_table,
                target_column,
                on_delete: OnDelete::parse_lenient(&deltype),
            })
            .collect())
    }

    /// Views reading `(table, column)`, directly or through other views.
    ///
    /// The result is the full transitive closure, ordered so that every view
    /// comes after the views it selects from. Recreating them in this order
    /// always succeeds.
    pub async fn views_depending_on(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
        column: &str,
    ) -> Result<Vec<ViewDependency>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            WITH RECURSIVE deps(view_oid, depth) AS (
                SELECT DISTINCT pgr.ev_class, 1
                  FROM pg_attribute AS pga
                  JOIN pg_depend AS pgd
                    ON pgd.refobjsubid = pga.attnum AND pgd.refobjid = pga.attrelid
                  JOIN pg_rewrite AS pgr ON pgr.oid = pgd.objid
                 WHERE pgd.classid = 'pg_rewrite'::regclass
                   AND pgd.refclassid = 'pg_class'::regclass
                   AND pgd.deptype = 'n'
                   AND pga.attrelid = to_regclass(quote_ident($3) || '.' || quote_ident($1))
                   AND pga.attname = $2
                UNION
                SELECT pgr.ev_class, deps.depth + 1
                  FROM deps
                  JOIN pg_depend AS pgd
                    ON pgd.refobjid = deps.view_oid AND pgd.refclassid = 'pg_class'::regclass
                  JOIN pg_rewrite AS pgr ON pgr.oid = pgd.objid
                 WHERE pgd.classid = 'pg_rewrite'::regclass
                   AND pgd.deptype = 'n'
                   AND pgr.ev_class <> deps.view_oid
            )
            SELECT n.nspname::text, c.relname::text, pg_get_viewdef(c.oid)
              FROM (SELECT view_oid, max(depth) AS depth FROM deps GROUP BY view_oid) AS v
              JOIN pg_class AS c ON c.oid = v.view_oid
              JOIN pg_namespace AS n ON n.oid = c.relnamespace
             WHERE c.relkind = 'v'
             ORDER BY v.depth, c.relname
            "#,
        )
        .bind(table)
        .bind(column)
        .bind(&self.schema)
        .fetch_all(cur.conn())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(schema, name, definition)| ViewDependency {
                schema,
                name,
                definition,
            })
            .collect())
    }
}
