use anyhow::Result;
use clap::Parser;
use console::style;

use pgshift_runtime::{CatalogInspector, Cursor, Database, IntegerWidener};

use super::{print_json, GlobalArgs};

/// Widen an int4 column to int8.
#[derive(Parser)]
pub struct WidenCommand {
    /// Table name.
    pub table: String,

    /// Column name.
    pub column: String,
}

impl WidenCommand {
    pub async fn execute(self, db: &Database, args: &GlobalArgs) -> Result<()> {
        let inspector = CatalogInspector::new(db.config().schema.clone());
        let mut tx = db.begin().await?;

        let report = {
            let mut cur = Cursor::new(&mut *tx);
            match inspector.column_type(&mut cur, &self.table, &self.column).await? {
                Some(t) if t == "int4" => {}
                Some(t) => anyhow::bail!(
                    "Column {:?}.{:?} is {}, only int4 columns can be widened",
                    self.table,
                    self.column,
                    t
                ),
                None => anyhow::bail!("Column {:?}.{:?} does not exist", self.table, self.column),
            }
            IntegerWidener::new(inspector)
                .widen(&mut cur, &self.table, &self.column)
                .await?
        };
        tx.commit().await?;

        if args.json {
            return print_json(&report);
        }

        println!();
        for col in &report.widened {
            println!("  {} {} is now int8", style("✓").green(), style(col).cyan());
        }
        for seq in &report.sequences {
            println!("  {} sequence {} is now bigint", style("✓").green(), seq);
        }
        for view in &report.views_recreated {
            println!("  {} recreated view {}", style("↻").blue(), view);
        }
        println!();
        Ok(())
    }
}
