pub mod config;
pub mod error;
pub mod plan;
pub mod schema;
pub mod sql;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::PgShiftConfig;
pub use error::{PgShiftError, Result};
pub use plan::{MigrationPlan, PlanStep};
pub use schema::{
    ColumnDescriptor, ColumnRef, ConstraintDescriptor, ExistingForeignKey, ForeignKeyBinding,
    IndexDescriptor, OnDelete, TableDescriptor, TableKind, ViewDependency,
};
