//! int4 -> int8 widening across foreign keys and dependent views.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tracing::info;

use pgshift_core::error::Result;
use pgshift_core::schema::ColumnRef;
use pgshift_core::sql::quote_ident;

use crate::catalog::CatalogInspector;
use crate::db::Cursor;
use crate::mutate::SCHEMA_TARGET;

/// `AS BIGINT` on sequences needs PostgreSQL 10; older sequences are
/// already 64-bit.
const SEQUENCE_AS_TYPE_MIN_VERSION: i32 = 100_000;

// Not `Send`: the catalog queries borrow the column names across awaits.
type BoxFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a>>;

/// What a widening cascade touched, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WideningReport {
    pub widened: Vec<ColumnRef>,
    /// Qualified names of views dropped and recreated. A view depending on
    /// several widened columns appears once per recreation.
    pub views_recreated: Vec<String>,
    pub sequences: Vec<String>,
}

/// Widens an int4 column to int8 together with every column referencing it
/// by foreign key.
///
/// Every failure is fatal; the caller's transaction must be rolled back.
///
/// Only plain views are dropped and recreated. A materialized view over a
/// widened column makes the `ALTER TABLE` fail, and has to be dropped by the
/// caller first.
#[derive(Debug, Clone, Default)]
pub struct IntegerWidener {
    inspector: CatalogInspector,
}

impl IntegerWidener {
    pub fn new(inspector: CatalogInspector) -> Self {
        Self { inspector }
    }

    pub async fn widen(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
        column: &str,
    ) -> Result<WideningReport> {
        let mut visited = HashSet::new();
        let mut report = WideningReport::default();
        self.widen_column(cur, ColumnRef::new(table, column), &mut visited, &mut report)
            .await?;
        Ok(report)
    }

    fn widen_column<'a>(
        &'a self,
        cur: &'a mut Cursor<'_>,
        target: ColumnRef,
        visited: &'a mut HashSet<ColumnRef>,
        report: &'a mut WideningReport,
    ) -> BoxFuture<'a> {
        Box::pin(async move {
            // A malformed schema can reference a column from itself.
            if !visited.insert(target.clone()) {
                return Ok(());
            }
            let ColumnRef { table, column } = &target;

            // Both must be read before the type changes: the dependency rows
            // are rewritten with it.
            let dependents = self
                .inspector
                .foreign_keys_referencing(cur, table, column)
                .await?;
            let views = self.inspector.views_depending_on(cur, table, column).await?;

            for view in &views {
                info!(target: SCHEMA_TARGET, view = %view.qualified_name(), "dropping view");
                cur.execute(&format!("DROP VIEW IF EXISTS {} CASCADE", view.qualified_name()))
                    .await?;
            }

            info!(target: SCHEMA_TARGET, %table, %column, "changing column type to int8");
            cur.execute(&widen_sql(table, column)).await?;
            report.widened.push(target.clone());

            for dependent in dependents {
                self.widen_column(cur, dependent, visited, report).await?;
            }

            if column == "id" {
                self.widen_sequence(cur, table, column, report).await?;
            }

            for view in &views {
                info!(target: SCHEMA_TARGET, view = %view.qualified_name(), "recreating view");
                cur.execute(&view.create_sql()).await?;
                report.views_recreated.push(view.qualified_name());
            }

            Ok(())
        })
    }

    async fn widen_sequence(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
        column: &str,
        report: &mut WideningReport,
    ) -> Result<()> {
        if cur.server_version_num().await? < SEQUENCE_AS_TYPE_MIN_VERSION {
            return Ok(());
        }

        let relation = format!(
            "{}.{}",
            quote_ident(self.inspector.schema()),
            quote_ident(table)
        );
        let sequence: Option<String> =
            sqlx::query_scalar("SELECT pg_get_serial_sequence($1, $2)::text")
                .bind(&relation)
                .bind(column)
                .fetch_one(cur.conn())
                .await?;

        if let Some(sequence) = sequence {
            info!(target: SCHEMA_TARGET, %sequence, "changing sequence type to bigint");
            cur.execute(&format!("ALTER SEQUENCE {} AS BIGINT", sequence))
                .await?;
            report.sequences.push(sequence);
        }
        Ok(())
    }
}

fn widen_sql(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} ALTER COLUMN {} TYPE int8",
        quote_ident(table),
        quote_ident(column)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widen_sql() {
        assert_eq!(
            widen_sql("res_partner", "id"),
            "ALTER TABLE \"res_partner\" ALTER COLUMN \"id\" TYPE int8"
        );
    }

    #[test]
    fn test_report_serializes() {
        let report = WideningReport {
            widened: vec![ColumnRef::new("a", "id")],
            views_recreated: vec![],
            sequences: vec!["public.a_id_seq".into()],
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["widened"][0]["table"], "a");
        assert_eq!(value["sequences"][0], "public.a_id_seq");
    }
}
