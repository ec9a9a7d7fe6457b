use anyhow::Result;
use clap::Parser;
use console::style;
use serde_json::json;

use pgshift_core::schema::{ForeignKeyBinding, OnDelete};
use pgshift_runtime::{CatalogInspector, Cursor, Database, ForeignKeyReconciler, SchemaMutator};

use super::{print_json, GlobalArgs};

/// Make a column carry exactly one foreign key to the given target.
#[derive(Parser)]
pub struct FixFkCommand {
    /// Table holding the foreign key.
    pub table: String,

    /// Column holding the foreign key.
    pub column: String,

    /// Referenced table.
    pub target_table: String,

    /// Referenced column.
    pub target_column: String,

    /// Delete action: restrict, no action, cascade, set null, set default.
    #[arg(long, default_value = "no action")]
    pub on_delete: OnDelete,
}

impl FixFkCommand {
    pub async fn execute(self, db: &Database, args: &GlobalArgs) -> Result<()> {
        let inspector = CatalogInspector::new(db.config().schema.clone());
        let reconciler = ForeignKeyReconciler::new(SchemaMutator::new(inspector));
        let binding = ForeignKeyBinding::new(
            self.table,
            self.column,
            self.target_table,
            self.target_column,
            self.on_delete,
        );

        let mut tx = db.begin().await?;
        let recreated = {
            let mut cur = Cursor::new(&mut *tx);
            reconciler.reconcile(&mut cur, &binding).await?
        };
        tx.commit().await?;

        if args.json {
            return print_json(&json!({ "binding": binding, "recreated": recreated }));
        }

        let target = format!(
            "{}.{} -> {}.{} ON DELETE {}",
            binding.source_table,
            binding.source_column,
            binding.target_table,
            binding.target_column,
            binding.on_delete
        );
        if recreated {
            println!("  {} Created {}", style("✓").green(), style(target).cyan());
        } else {
            println!("  {} Already in place: {}", style("ℹ").blue(), target);
        }
        Ok(())
    }
}
