//! DDL issued against the caller's transaction.
//!
//! Each applied change emits one `debug!` record on the `pgshift::schema`
//! target. Operations that may legitimately be refused by the data run in a
//! savepoint and report a soft failure with `warn!` and the corrective SQL.

mod outcome;

pub use outcome::{ConversionPath, MutationOutcome};

use tracing::{debug, warn};

use pgshift_core::error::{PgShiftError, Result};
use pgshift_core::schema::OnDelete;
use pgshift_core::sql::{is_int4, is_int8, quote_ident, quote_literal};

use crate::catalog::CatalogInspector;
use crate::db::Cursor;
use crate::widening::IntegerWidener;

pub(crate) const SCHEMA_TARGET: &str = "pgshift::schema";

/// Temporary name the copy-cast fallback moves the old column to.
const TEMP_CAST_COLUMN: &str = "__temp_type_cast";

/// Issues schema changes.
#[derive(Debug, Clone, Default)]
pub struct SchemaMutator {
    inspector: CatalogInspector,
}

impl SchemaMutator {
    pub fn new(inspector: CatalogInspector) -> Self {
        Self { inspector }
    }

    pub fn inspector(&self) -> &CatalogInspector {
        &self.inspector
    }

    /// Create a table with a single auto-incrementing `id` primary key.
    ///
    /// Not guarded: an existing table is a [`PgShiftError::DuplicateObject`],
    /// and leaves the outer transaction aborted.
    pub async fn create_table(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
        bigint: bool,
        comment: Option<&str>,
    ) -> Result<()> {
        let sql = create_table_sql(table, bigint);
        cur.execute(&sql).await.map_err(|e| {
            if e.is_duplicate_object() {
                PgShiftError::DuplicateObject(format!("table {:?}", table))
            } else {
                e
            }
        })?;
        if let Some(comment) = comment {
            cur.execute(&format!(
                "COMMENT ON TABLE {} IS {}",
                quote_ident(table),
                quote_literal(comment)
            ))
            .await?;
        }
        debug!(target: SCHEMA_TARGET, table, "Table {:?}: created", table);
        Ok(())
    }

    /// Add a nullable column. Not guarded against an existing column.
    pub async fn create_column(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
        column: &str,
        sql_type: &str,
        comment: Option<&str>,
    ) -> Result<()> {
        cur.execute(&format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(table),
            quote_ident(column),
            sql_type
        ))
        .await?;
        if let Some(comment) = comment {
            cur.execute(&format!(
                "COMMENT ON COLUMN {}.{} IS {}",
                quote_ident(table),
                quote_ident(column),
                quote_literal(comment)
            ))
            .await?;
        }
        debug!(
            target: SCHEMA_TARGET,
            table, column, sql_type,
            "Table {:?}: added column {:?} of type {}", table, column, sql_type
        );
        Ok(())
    }

    pub async fn rename_column(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
        from: &str,
        to: &str,
    ) -> Result<()> {
        cur.execute(&format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            quote_ident(table),
            quote_ident(from),
            quote_ident(to)
        ))
        .await?;
        debug!(target: SCHEMA_TARGET, table, "Table {:?}: renamed column {:?} to {:?}", table, from, to);
        Ok(())
    }

    /// Change a column's type.
    ///
    /// int4 -> int8 goes through the widening engine, which also handles
    /// referencing columns and dependent views. Anything else is first tried
    /// in place inside a savepoint; if the engine refuses, the column is
    /// rebuilt by copying its values through an explicit cast. That last path
    /// has no fallback: its failures are fatal.
    pub async fn convert_column(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
        column: &str,
        sql_type: &str,
    ) -> Result<ConversionPath> {
        if is_int8(sql_type) {
            let current = self.inspector.column_type(cur, table, column).await?;
            if current.as_deref().is_some_and(is_int4) {
                IntegerWidener::new(self.inspector.clone())
                    .widen(cur, table, column)
                    .await?;
                debug!(
                    target: SCHEMA_TARGET,
                    table, column,
                    "Table {:?}: column {:?} changed to type {}", table, column, sql_type
                );
                return Ok(ConversionPath::Widened);
            }
        }

        let alter = format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
            quote_ident(table),
            quote_ident(column),
            sql_type
        );
        let path = match cur.savepoint_quiet(&[alter]).await? {
            Ok(()) => ConversionPath::InPlace,
            Err(refused) => {
                debug!(
                    target: SCHEMA_TARGET,
                    table, column, error = %refused,
                    "Table {:?}: in-place conversion of {:?} refused, copying through a cast",
                    table, column
                );
                for sql in copy_cast_sql(table, column, sql_type) {
                    cur.execute(&sql).await?;
                }
                ConversionPath::CopyCast
            }
        };

        debug!(
            target: SCHEMA_TARGET,
            table, column,
            "Table {:?}: column {:?} changed to type {}", table, column, sql_type
        );
        Ok(path)
    }

    /// Add NOT NULL to a column.
    ///
    /// Existing NULLs make the engine refuse; that is reported as a soft
    /// failure carrying the statement to run once the data is fixed.
    pub async fn set_not_null(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
        column: &str,
    ) -> Result<MutationOutcome> {
        let sql = format!(
            "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
            quote_ident(table),
            quote_ident(column)
        );
        match cur.savepoint(std::slice::from_ref(&sql)).await? {
            Ok(()) => {
                debug!(target: SCHEMA_TARGET, table, column, "Table {:?}: column {:?}: added constraint NOT NULL", table, column);
                Ok(MutationOutcome::Applied)
            }
            Err(e) => {
                warn!(
                    target: SCHEMA_TARGET,
                    table, column, error = %e, remediation = %sql,
                    "Table {:?}: unable to set NOT NULL on column {:?}!\n\
                     If you want to have it, you should update the records and execute manually:\n{}",
                    table, column, sql
                );
                Ok(MutationOutcome::failed(e, Some(sql)))
            }
        }
    }

    pub async fn drop_not_null(&self, cur: &mut Cursor<'_>, table: &str, column: &str) -> Result<()> {
        cur.execute(&format!(
            "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL",
            quote_ident(table),
            quote_ident(column)
        ))
        .await?;
        debug!(target: SCHEMA_TARGET, table, column, "Table {:?}: column {:?}: dropped constraint NOT NULL", table, column);
        Ok(())
    }

    /// Add a constraint and store its definition as the constraint comment,
    /// so [`CatalogInspector::constraint_definition`] returns it verbatim.
    pub async fn add_constraint(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
        name: &str,
        definition: &str,
    ) -> Result<MutationOutcome> {
        let add = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} {}",
            quote_ident(table),
            quote_ident(name),
            definition
        );
        let comment = format!(
            "COMMENT ON CONSTRAINT {} ON {} IS {}",
            quote_ident(name),
            quote_ident(table),
            quote_literal(definition)
        );
        match cur.savepoint(&[add.clone(), comment]).await? {
            Ok(()) => {
                debug!(target: SCHEMA_TARGET, table, constraint = name, "Table {:?}: added constraint {:?} as {}", table, name, definition);
                Ok(MutationOutcome::Applied)
            }
            Err(e) => {
                warn!(
                    target: SCHEMA_TARGET,
                    table, constraint = name, error = %e, remediation = %add,
                    "Table {:?}: unable to add constraint {:?}!\n\
                     If you want to have it, you should update the records and execute manually:\n{}",
                    table, name, add
                );
                Ok(MutationOutcome::failed(e, Some(add)))
            }
        }
    }

    /// Drop a constraint. A missing or still-referenced constraint is a soft
    /// failure.
    pub async fn drop_constraint(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
        name: &str,
    ) -> Result<MutationOutcome> {
        let sql = format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            quote_ident(table),
            quote_ident(name)
        );
        match cur.savepoint(std::slice::from_ref(&sql)).await? {
            Ok(()) => {
                debug!(target: SCHEMA_TARGET, table, constraint = name, "Table {:?}: dropped constraint {:?}", table, name);
                Ok(MutationOutcome::Applied)
            }
            Err(e) => {
                warn!(
                    target: SCHEMA_TARGET,
                    table, constraint = name, error = %e,
                    "Table {:?}: unable to drop constraint {:?}!", table, name
                );
                Ok(MutationOutcome::failed(e, Some(sql)))
            }
        }
    }

    /// Create a single-column foreign key. Not guarded; go through the
    /// reconciler unless the key is known to be absent.
    pub async fn add_foreign_key(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
        column: &str,
        target_table: &str,
        target_column: &str,
        on_delete: OnDelete,
    ) -> Result<bool> {
        cur.execute(&add_foreign_key_sql(table, column, target_table, target_column, on_delete))
            .await?;
        debug!(
            target: SCHEMA_TARGET,
            table, column,
            "Table {:?}: added foreign key {:?} references {:?}({:?}) ON DELETE {}",
            table, column, target_table, target_column, on_delete
        );
        Ok(true)
    }

    /// Create an index unless one with that name exists. The existing index's
    /// definition is not compared.
    pub async fn create_index(
        &self,
        cur: &mut Cursor<'_>,
        name: &str,
        table: &str,
        expressions: &[String],
    ) -> Result<MutationOutcome> {
        self.create_index_inner(cur, name, table, expressions, false).await
    }

    /// [`SchemaMutator::create_index`] for a unique index.
    pub async fn create_unique_index(
        &self,
        cur: &mut Cursor<'_>,
        name: &str,
        table: &str,
        expressions: &[String],
    ) -> Result<MutationOutcome> {
        self.create_index_inner(cur, name, table, expressions, true).await
    }

    async fn create_index_inner(
        &self,
        cur: &mut Cursor<'_>,
        name: &str,
        table: &str,
        expressions: &[String],
        unique: bool,
    ) -> Result<MutationOutcome> {
        if self.inspector.index_exists(cur, name).await? {
            return Ok(MutationOutcome::AlreadySatisfied);
        }
        let sql = create_index_sql(name, table, expressions, unique)?;
        cur.execute(&sql).await?;
        debug!(
            target: SCHEMA_TARGET,
            table, index = name,
            "Table {:?}: created index {:?} ({})", table, name, expressions.join(", ")
        );
        Ok(MutationOutcome::Applied)
    }

    /// Drop an index if it exists.
    pub async fn drop_index(&self, cur: &mut Cursor<'_>, name: &str, table: &str) -> Result<()> {
        cur.execute(&format!("DROP INDEX IF EXISTS {}", quote_ident(name)))
            .await?;
        debug!(target: SCHEMA_TARGET, table, index = name, "Table {:?}: dropped index {:?}", table, name);
        Ok(())
    }

    /// Drop a view if it exists, along with the views built on it.
    pub async fn drop_view_if_exists(&self, cur: &mut Cursor<'_>, view: &str) -> Result<()> {
        cur.execute(&format!("DROP VIEW IF EXISTS {} CASCADE", quote_ident(view)))
            .await?;
        debug!(target: SCHEMA_TARGET, view, "View {:?}: dropped", view);
        Ok(())
    }
}

fn create_table_sql(table: &str, bigint: bool) -> String {
    format!(
        "CREATE TABLE {} (id {} NOT NULL, PRIMARY KEY(id))",
        quote_ident(table),
        if bigint { "BIGSERIAL" } else { "SERIAL" }
    )
}

fn add_foreign_key_sql(
    table: &str,
    column: &str,
    target_table: &str,
    target_column: &str,
    on_delete: OnDelete,
) -> String {
    format!(
        "ALTER TABLE {} ADD FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE {}",
        quote_ident(table),
        quote_ident(column),
        quote_ident(target_table),
        quote_ident(target_column),
        on_delete.as_sql()
    )
}

fn create_index_sql(name: &str, table: &str, expressions: &[String], unique: bool) -> Result<String> {
    if expressions.is_empty() {
        return Err(PgShiftError::InvalidArgument(format!(
            "index {:?} needs at least one expression",
            name
        )));
    }
    Ok(format!(
        "CREATE {}INDEX {} ON {} ({})",
        if unique { "UNIQUE " } else { "" },
        quote_ident(name),
        quote_ident(table),
        expressions.join(", ")
    ))
}

/// Statements rebuilding a column under a new type when `ALTER TYPE` is refused.
fn copy_cast_sql(table: &str, column: &str, sql_type: &str) -> [String; 4] {
    let table = quote_ident(table);
    let column = quote_ident(column);
    let temp = quote_ident(TEMP_CAST_COLUMN);
    [
        format!("ALTER TABLE {} RENAME COLUMN {} TO {}", table, column, temp),
        format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, sql_type),
        format!("UPDATE {} SET {} = {}::{}", table, column, temp, sql_type),
        format!("ALTER TABLE {} DROP COLUMN {} CASCADE", table, temp),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_sql() {
        assert_eq!(
            create_table_sql("res_partner", false),
            "CREATE TABLE \"res_partner\" (id SERIAL NOT NULL, PRIMARY KEY(id))"
        );
        assert_eq!(
            create_table_sql("res_partner", true),
            "CREATE TABLE \"res_partner\" (id BIGSERIAL NOT NULL, PRIMARY KEY(id))"
        );
    }

    #[test]
    fn test_add_foreign_key_sql() {
        assert_eq!(
            add_foreign_key_sql("sale_order", "partner_id", "res_partner", "id", OnDelete::SetNull),
            "ALTER TABLE \"sale_order\" ADD FOREIGN KEY (\"partner_id\") REFERENCES \"res_partner\"(\"id\") ON DELETE SET NULL"
        );
    }

    #[test]
    fn test_create_index_sql() {
        let exprs = vec!["\"name\"".to_string(), "lower(\"email\")".to_string()];
        assert_eq!(
            create_index_sql("partner_idx", "res_partner", &exprs, false).unwrap(),
            "CREATE INDEX \"partner_idx\" ON \"res_partner\" (\"name\", lower(\"email\"))"
        );
        assert_eq!(
            create_index_sql("partner_uniq", "res_partner", &exprs[..1], true).unwrap(),
            "CREATE UNIQUE INDEX \"partner_uniq\" ON \"res_partner\" (\"name\")"
        );
    }

    #[test]
    fn test_create_index_requires_expressions() {
        assert!(matches!(
            create_index_sql("idx", "t", &[], false),
            Err(PgShiftError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_copy_cast_sql() {
        let stmts = copy_cast_sql("product", "weight", "numeric");
        assert_eq!(
            stmts[0],
            "ALTER TABLE \"product\" RENAME COLUMN \"weight\" TO \"__temp_type_cast\""
        );
        assert_eq!(stmts[1], "ALTER TABLE \"product\" ADD COLUMN \"weight\" numeric");
        assert_eq!(
            stmts[2],
            "UPDATE \"product\" SET \"weight\" = \"__temp_type_cast\"::numeric"
        );
        assert_eq!(
            stmts[3],
            "ALTER TABLE \"product\" DROP COLUMN \"__temp_type_cast\" CASCADE"
        );
    }
}
