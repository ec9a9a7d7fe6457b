//! Schema inspection and safe in-transaction migration for PostgreSQL.
//!
//! Every operation takes a [`Cursor`] over the caller's transaction and
//! never commits or rolls it back. [`PlanRunner`] is the one exception: it
//! owns the transaction a whole [`MigrationPlan`](pgshift_core::MigrationPlan)
//! runs in.

pub mod catalog;
pub mod db;
pub mod foreign_keys;
pub mod mutate;
pub mod runner;
pub mod widening;

pub use catalog::CatalogInspector;
pub use db::{Cursor, Database, SavepointResult};
pub use foreign_keys::{ForeignKeyReconciler, ReconcilePlan};
pub use mutate::{ConversionPath, MutationOutcome, SchemaMutator};
pub use runner::{PlanReport, PlanRunner, StepReport};
pub use widening::{IntegerWidener, WideningReport};
