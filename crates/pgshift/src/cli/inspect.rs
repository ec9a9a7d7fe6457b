use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use serde::Serialize;

use pgshift_core::schema::{
    ColumnDescriptor, ColumnRef, ConstraintDescriptor, ExistingForeignKey, IndexDescriptor,
    TableDescriptor, ViewDependency,
};
use pgshift_runtime::{CatalogInspector, Cursor, Database};

use super::{print_json, GlobalArgs};

/// Show what the catalog knows about a table or column.
#[derive(Parser)]
pub struct InspectCommand {
    #[command(subcommand)]
    pub target: InspectTarget,
}

#[derive(Subcommand)]
pub enum InspectTarget {
    /// Kind, columns and constraints of a table.
    Table {
        /// Table name.
        table: String,
    },

    /// Type, indexes, foreign keys and dependent views of a column.
    Column {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
}

#[derive(Serialize)]
struct TableReport {
    table: TableDescriptor,
    columns: Vec<ColumnDescriptor>,
    constraints: Vec<ConstraintDescriptor>,
}

#[derive(Serialize)]
struct ColumnReport {
    table: String,
    column: ColumnDescriptor,
    indexes: Vec<IndexDescriptor>,
    foreign_keys: Vec<ExistingForeignKey>,
    referenced_by: Vec<ColumnRef>,
    views: Vec<ViewDependency>,
}

impl InspectCommand {
    pub async fn execute(self, db: &Database, args: &GlobalArgs) -> Result<()> {
        let inspector = CatalogInspector::new(db.config().schema.clone());
        let mut conn = db.pool().acquire().await?;
        let mut cur = Cursor::new(&mut conn);

        match self.target {
            InspectTarget::Table { table } => {
                let Some(descriptor) = inspector.describe_table(&mut cur, &table).await? else {
                    anyhow::bail!("Table {:?} does not exist", table);
                };
                let report = TableReport {
                    columns: inspector
                        .columns_of(&mut cur, &table)
                        .await?
                        .into_values()
                        .collect(),
                    constraints: inspector.constraints_of(&mut cur, &table).await?,
                    table: descriptor,
                };
                if args.json {
                    return print_json(&report);
                }
                print_table(&report);
            }

            InspectTarget::Column { table, column } => {
                let columns = inspector.columns_of(&mut cur, &table).await?;
                let Some(descriptor) = columns.get(&column).cloned() else {
                    anyhow::bail!("Column {:?}.{:?} does not exist", table, column);
                };
                let mut indexes: Vec<IndexDescriptor> = inspector
                    .indexes_on_column(&mut cur, &table, &column)
                    .await?
                    .into_iter()
                    .collect();
                indexes.sort_by(|a, b| a.name.cmp(&b.name));

                let report = ColumnReport {
                    indexes,
                    foreign_keys: inspector.foreign_keys_from(&mut cur, &table, &column).await?,
                    referenced_by: inspector
                        .foreign_keys_referencing(&mut cur, &table, &column)
                        .await?,
                    views: inspector.views_depending_on(&mut cur, &table, &column).await?,
                    column: descriptor,
                    table,
                };
                if args.json {
                    return print_json(&report);
                }
                print_column(&report);
            }
        }

        Ok(())
    }
}

fn print_table(report: &TableReport) {
    println!();
    println!(
        "  {} {}",
        style(&report.table.name).bold().cyan(),
        style(format!("({})", report.table.kind)).dim()
    );
    println!();

    for col in &report.columns {
        println!(
            "    {:<32} {:<16} {}",
            col.name,
            style(type_label(col)).yellow(),
            if col.nullable {
                style("null").dim()
            } else {
                style("not null").green()
            }
        );
    }

    if !report.constraints.is_empty() {
        println!();
        for con in &report.constraints {
            println!("    {} {} {}", style("◆").blue(), con.name, style(&con.definition).dim());
        }
    }
    println!();
}

fn print_column(report: &ColumnReport) {
    println!();
    println!(
        "  {}.{} {}",
        style(&report.table).bold().cyan(),
        style(&report.column.name).bold().cyan(),
        style(type_label(&report.column)).yellow()
    );
    println!();

    if report.indexes.is_empty()
        && report.foreign_keys.is_empty()
        && report.referenced_by.is_empty()
        && report.views.is_empty()
    {
        println!("  {} No indexes, foreign keys or dependent views", style("ℹ").blue());
        println!();
        return;
    }

    for index in &report.indexes {
        let kind = if index.unique { "unique index" } else { "index" };
        println!("  {} {} {}", style(kind).dim(), index.name, style(&index.definition).dim());
    }
    for fk in &report.foreign_keys {
        println!(
            "  {} {} -> {}.{} ON DELETE {}",
            style("foreign key").dim(),
            fk.name,
            fk.target_table,
            fk.target_column,
            fk.on_delete
        );
    }
    for source in &report.referenced_by {
        println!("  {} {}", style("referenced by").dim(), source);
    }
    for view in &report.views {
        println!("  {} {}", style("view").dim(), view.qualified_name());
    }
    println!();
}

fn type_label(col: &ColumnDescriptor) -> String {
    match col.max_length {
        Some(n) => format!("{}({})", col.udt_name, n),
        None => col.udt_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_label() {
        let mut col = ColumnDescriptor {
            name: "name".into(),
            udt_name: "varchar".into(),
            max_length: Some(64),
            nullable: true,
        };
        assert_eq!(type_label(&col), "varchar(64)");
        col.max_length = None;
        assert_eq!(type_label(&col), "varchar");
    }
}
