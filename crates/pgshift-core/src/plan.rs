//! Migration plans: an ordered list of schema steps read from TOML.
//!
//! ```toml
//! [[step]]
//! action = "create_table"
//! table = "fleet_vehicle"
//! bigint = true
//!
//! [[step]]
//! action = "convert_column"
//! table = "res_partner"
//! column = "id"
//! sql_type = "int8"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::substitute_env_vars;
use crate::error::{PgShiftError, Result};
use crate::schema::OnDelete;

/// An ordered list of steps applied in one transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationPlan {
    #[serde(default, rename = "step")]
    pub steps: Vec<PlanStep>,
}

impl MigrationPlan {
    /// Load a plan from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| PgShiftError::Plan(format!("Failed to read plan file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse a plan from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);
        let plan: Self = toml::from_str(&content)
            .map_err(|e| PgShiftError::Plan(format!("Failed to parse plan: {}", e)))?;
        plan.validate()?;
        Ok(plan)
    }

    fn validate(&self) -> Result<()> {
        for (idx, step) in self.steps.iter().enumerate() {
            if step.table().trim().is_empty() {
                return Err(PgShiftError::Plan(format!(
                    "step {} ({}) has an empty table name",
                    idx + 1,
                    step.action()
                )));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// One schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanStep {
    CreateTable {
        table: String,
        #[serde(default)]
        bigint: bool,
        comment: Option<String>,
    },
    CreateColumn {
        table: String,
        column: String,
        sql_type: String,
        comment: Option<String>,
    },
    RenameColumn {
        table: String,
        column: String,
        new_name: String,
    },
    ConvertColumn {
        table: String,
        column: String,
        sql_type: String,
    },
    SetNotNull {
        table: String,
        column: String,
    },
    DropNotNull {
        table: String,
        column: String,
    },
    AddConstraint {
        table: String,
        name: String,
        definition: String,
    },
    DropConstraint {
        table: String,
        name: String,
    },
    EnsureForeignKey {
        table: String,
        column: String,
        target_table: String,
        target_column: String,
        #[serde(default)]
        on_delete: OnDelete,
    },
    CreateIndex {
        table: String,
        name: String,
        expressions: Vec<String>,
        #[serde(default)]
        unique: bool,
    },
    DropIndex {
        table: String,
        name: String,
    },
    DropView {
        /// View name; views are looked up like tables.
        table: String,
    },
}

impl PlanStep {
    /// The table (or view) this step touches.
    pub fn table(&self) -> &str {
        match self {
            PlanStep::CreateTable { table, .. }
            | PlanStep::CreateColumn { table, .. }
            | PlanStep::RenameColumn { table, .. }
            | PlanStep::ConvertColumn { table, .. }
            | PlanStep::SetNotNull { table, .. }
            | PlanStep::DropNotNull { table, .. }
            | PlanStep::AddConstraint { table, .. }
            | PlanStep::DropConstraint { table, .. }
            | PlanStep::EnsureForeignKey { table, .. }
            | PlanStep::CreateIndex { table, .. }
            | PlanStep::DropIndex { table, .. }
            | PlanStep::DropView { table } => table,
        }
    }

    /// The `action` tag, for reports.
    pub fn action(&self) -> &'static str {
        match self {
            PlanStep::CreateTable { .. } => "create_table",
            PlanStep::CreateColumn { .. } => "create_column",
            PlanStep::RenameColumn { .. } => "rename_column",
            PlanStep::ConvertColumn { .. } => "convert_column",
            PlanStep::SetNotNull { .. } => "set_not_null",
            PlanStep::DropNotNull { .. } => "drop_not_null",
            PlanStep::AddConstraint { .. } => "add_constraint",
            PlanStep::DropConstraint { .. } => "drop_constraint",
            PlanStep::EnsureForeignKey { .. } => "ensure_foreign_key",
            PlanStep::CreateIndex { .. } => "create_index",
            PlanStep::DropIndex { .. } => "drop_index",
            PlanStep::DropView { .. } => "drop_view",
        }
    }
}
