//! Plan runner with run-exclusive locking.
//!
//! Only one plan runs against a database at a time: every run holds a
//! PostgreSQL advisory lock on its connection for the whole transaction.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::{Connection, PgConnection, Postgres};
use tracing::{debug, error, info, info_span, warn, Instrument};

use pgshift_core::error::{PgShiftError, Result};
use pgshift_core::plan::{MigrationPlan, PlanStep};
use pgshift_core::schema::{ForeignKeyBinding, TableKind};
use pgshift_core::sql::{is_int4, is_int8};

use crate::catalog::CatalogInspector;
use crate::db::{Cursor, Database};
use crate::foreign_keys::ForeignKeyReconciler;
use crate::mutate::{MutationOutcome, SchemaMutator};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Result of one plan step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// 1-based position in the plan.
    pub index: usize,
    pub action: &'static str,
    pub table: String,
    pub outcome: MutationOutcome,
    /// Extra detail, e.g. the path a type conversion took.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Outcome of a committed plan run.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
}

impl PlanReport {
    pub fn applied(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_applied()).count()
    }

    pub fn already_satisfied(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.outcome == MutationOutcome::AlreadySatisfied)
            .count()
    }

    pub fn soft_failures(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.outcome.is_soft_failure())
            .count()
    }
}

/// Applies a [`MigrationPlan`] in one transaction.
pub struct PlanRunner {
    db: Database,
    mutator: SchemaMutator,
    reconciler: ForeignKeyReconciler,
}

impl PlanRunner {
    pub fn new(db: Database) -> Self {
        let inspector = CatalogInspector::new(db.config().schema.clone());
        let mutator = SchemaMutator::new(inspector);
        Self {
            reconciler: ForeignKeyReconciler::new(mutator.clone()),
            mutator,
            db,
        }
    }

    fn inspector(&self) -> &CatalogInspector {
        self.mutator.inspector()
    }

    /// Run every step of `plan`.
    ///
    /// A fatal error in any step rolls the whole transaction back and is
    /// returned; soft failures are recorded in the report and the run goes on.
    pub async fn run(&self, plan: &MigrationPlan) -> Result<PlanReport> {
        let span = info_span!("plan_run", steps = plan.steps.len());
        async {
            let mut conn = self.db.pool().acquire().await?;
            self.acquire_lock(&mut conn).await?;

            let result = self.run_locked(&mut conn, plan).await;

            // Always release lock, even on error
            if let Err(e) = self.release_lock(&mut conn).await {
                warn!("Failed to release plan lock: {}", e);
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn run_locked(&self, conn: &mut PgConnection, plan: &MigrationPlan) -> Result<PlanReport> {
        let started_at = Utc::now();
        let mut tx = conn.begin().await?;
        let mut steps = Vec::with_capacity(plan.steps.len());

        for (idx, step) in plan.steps.iter().enumerate() {
            let index = idx + 1;
            let result = {
                let mut cur = Cursor::new(&mut *tx);
                self.apply_step(&mut cur, step).await
            };

            match result {
                Ok((outcome, detail)) => {
                    debug!(index, action = step.action(), table = step.table(), %outcome, "step done");
                    steps.push(StepReport {
                        index,
                        action: step.action(),
                        table: step.table().to_string(),
                        outcome,
                        detail,
                    });
                }
                Err(e) => {
                    error!(index, action = step.action(), table = step.table(), error = %e, "step failed, rolling back");
                    if let Err(rollback) = tx.rollback().await {
                        warn!("Failed to roll back plan transaction: {}", rollback);
                    }
                    return Err(e);
                }
            }
        }

        tx.commit().await?;

        let report = PlanReport {
            started_at,
            finished_at: Utc::now(),
            steps,
        };
        info!(
            applied = report.applied(),
            already_satisfied = report.already_satisfied(),
            soft_failures = report.soft_failures(),
            "Plan committed"
        );
        Ok(report)
    }

    async fn apply_step(
        &self,
        cur: &mut Cursor<'_>,
        step: &PlanStep,
    ) -> Result<(MutationOutcome, Option<String>)> {
        let inspector = self.inspector();
        let outcome = match step {
            PlanStep::CreateTable {
                table,
                bigint,
                comment,
            } => {
                if inspector.table_exists(cur, table).await? {
                    MutationOutcome::AlreadySatisfied
                } else {
                    self.mutator
                        .create_table(cur, table, *bigint, comment.as_deref())
                        .await?;
                    MutationOutcome::Applied
                }
            }
            PlanStep::CreateColumn {
                table,
                column,
                sql_type,
                comment,
            } => {
                if inspector.column_exists(cur, table, column).await? {
                    MutationOutcome::AlreadySatisfied
                } else {
                    self.mutator
                        .create_column(cur, table, column, sql_type, comment.as_deref())
                        .await?;
                    MutationOutcome::Applied
                }
            }
            PlanStep::RenameColumn {
                table,
                column,
                new_name,
            } => {
                let old_exists = inspector.column_exists(cur, table, column).await?;
                if !old_exists && inspector.column_exists(cur, table, new_name).await? {
                    MutationOutcome::AlreadySatisfied
                } else {
                    self.mutator
                        .rename_column(cur, table, column, new_name)
                        .await?;
                    MutationOutcome::Applied
                }
            }
            PlanStep::ConvertColumn {
                table,
                column,
                sql_type,
            } => {
                let current = inspector
                    .column_type(cur, table, column)
                    .await?
                    .ok_or_else(|| missing_column(table, column))?;
                if same_type(&current, sql_type) {
                    MutationOutcome::AlreadySatisfied
                } else {
                    let path = self
                        .mutator
                        .convert_column(cur, table, column, sql_type)
                        .await?;
                    return Ok((MutationOutcome::Applied, Some(path.as_str().to_string())));
                }
            }
            PlanStep::SetNotNull { table, column } => {
                let columns = inspector.columns_of(cur, table).await?;
                let desc = columns
                    .get(column)
                    .ok_or_else(|| missing_column(table, column))?;
                if !desc.nullable {
                    MutationOutcome::AlreadySatisfied
                } else {
                    self.mutator.set_not_null(cur, table, column).await?
                }
            }
            PlanStep::DropNotNull { table, column } => {
                let columns = inspector.columns_of(cur, table).await?;
                let desc = columns
                    .get(column)
                    .ok_or_else(|| missing_column(table, column))?;
                if desc.nullable {
                    MutationOutcome::AlreadySatisfied
                } else {
                    self.mutator.drop_not_null(cur, table, column).await?;
                    MutationOutcome::Applied
                }
            }
            PlanStep::AddConstraint {
                table,
                name,
                definition,
            } => match inspector.constraint_definition(cur, table, name).await? {
                Some(current) if current == *definition => MutationOutcome::AlreadySatisfied,
                Some(_) => {
                    // Definition changed: replace it.
                    let dropped = self.mutator.drop_constraint(cur, table, name).await?;
                    if dropped.is_soft_failure() {
                        dropped
                    } else {
                        self.mutator
                            .add_constraint(cur, table, name, definition)
                            .await?
                    }
                }
                None => {
                    self.mutator
                        .add_constraint(cur, table, name, definition)
                        .await?
                }
            },
            PlanStep::DropConstraint { table, name } => {
                if inspector
                    .constraint_definition(cur, table, name)
                    .await?
                    .is_none()
                {
                    MutationOutcome::AlreadySatisfied
                } else {
                    self.mutator.drop_constraint(cur, table, name).await?
                }
            }
            PlanStep::EnsureForeignKey {
                table,
                column,
                target_table,
                target_column,
                on_delete,
            } => {
                let binding =
                    ForeignKeyBinding::new(table, column, target_table, target_column, *on_delete);
                if self.reconciler.reconcile(cur, &binding).await? {
                    MutationOutcome::Applied
                } else {
                    MutationOutcome::AlreadySatisfied
                }
            }
            PlanStep::CreateIndex {
                table,
                name,
                expressions,
                unique,
            } => {
                if *unique {
                    self.mutator
                        .create_unique_index(cur, name, table, expressions)
                        .await?
                } else {
                    self.mutator
                        .create_index(cur, name, table, expressions)
                        .await?
                }
            }
            PlanStep::DropIndex { table, name } => {
                if inspector.index_exists(cur, name).await? {
                    self.mutator.drop_index(cur, name, table).await?;
                    MutationOutcome::Applied
                } else {
                    MutationOutcome::AlreadySatisfied
                }
            }
            PlanStep::DropView { table } => match inspector.table_kind(cur, table).await? {
                None => MutationOutcome::AlreadySatisfied,
                Some(TableKind::View) => {
                    self.mutator.drop_view_if_exists(cur, table).await?;
                    MutationOutcome::Applied
                }
                Some(kind) => {
                    return Err(PgShiftError::InvalidArgument(format!(
                        "{:?} is a {}, not a view",
                        table, kind
                    )))
                }
            },
        };
        Ok((outcome, None))
    }

    async fn acquire_lock(&self, conn: &mut PoolConnection<Postgres>) -> Result<()> {
        let lock_id = self.db.config().advisory_lock_id;
        let timeout = Duration::from_secs(self.db.config().lock_timeout_secs);
        debug!(lock_id, "Acquiring plan lock...");

        let wait = async {
            loop {
                let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
                    .bind(lock_id)
                    .fetch_one(&mut **conn)
                    .await?;
                if acquired {
                    return Ok::<(), PgShiftError>(());
                }
                tokio::time::sleep(LOCK_POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            PgShiftError::Database(format!(
                "Timed out after {}s waiting for plan lock {}",
                timeout.as_secs(),
                lock_id
            ))
        })??;

        debug!("Plan lock acquired");
        Ok(())
    }

    async fn release_lock(&self, conn: &mut PoolConnection<Postgres>) -> Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(self.db.config().advisory_lock_id)
            .execute(&mut **conn)
            .await
            .map_err(|e| PgShiftError::Database(format!("Failed to release plan lock: {}", e)))?;
        debug!("Plan lock released");
        Ok(())
    }
}

fn missing_column(table: &str, column: &str) -> PgShiftError {
    PgShiftError::Plan(format!("column {:?}.{:?} does not exist", table, column))
}

/// Whether a catalog `udt_name` already is the requested type.
fn same_type(udt_name: &str, sql_type: &str) -> bool {
    if is_int8(udt_name) || is_int4(udt_name) {
        return (is_int8(udt_name) && is_int8(sql_type)) || (is_int4(udt_name) && is_int4(sql_type));
    }
    udt_name.eq_ignore_ascii_case(sql_type.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_type() {
        assert!(same_type("int8", "bigint"));
        assert!(same_type("int4", "INTEGER"));
        assert!(!same_type("int4", "int8"));
        assert!(same_type("text", "TEXT"));
        assert!(!same_type("varchar", "varchar(64)"));
    }

    #[test]
    fn test_report_counts() {
        let step = |outcome| StepReport {
            index: 1,
            action: "set_not_null",
            table: "t".into(),
            outcome,
            detail: None,
        };
        let now = Utc::now();
        let report = PlanReport {
            started_at: now,
            finished_at: now,
            steps: vec![
                step(MutationOutcome::Applied),
                step(MutationOutcome::AlreadySatisfied),
                step(MutationOutcome::FailedSoft {
                    reason: "null values".into(),
                    remediation: None,
                }),
            ],
        };
        assert_eq!(report.applied(), 1);
        assert_eq!(report.already_satisfied(), 1);
        assert_eq!(report.soft_failures(), 1);
    }
}
