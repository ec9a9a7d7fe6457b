//! Bring the foreign keys of one source column to a single desired binding.

use tracing::debug;

use pgshift_core::error::Result;
use pgshift_core::schema::{ExistingForeignKey, ForeignKeyBinding};

use crate::db::Cursor;
use crate::mutate::{SchemaMutator, SCHEMA_TARGET};

/// Diff between the keys found on a source column and the desired one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcilePlan {
    /// Constraint names to drop, in catalog order.
    pub drop: Vec<String>,
    /// Whether the desired key must be created.
    pub create: bool,
}

impl ReconcilePlan {
    /// The first existing key equal to `desired` is kept; every other one is
    /// dropped, including later duplicates of the desired key.
    pub fn compute(existing: &[ExistingForeignKey], desired: &ForeignKeyBinding) -> Self {
        let mut found = false;
        let mut drop = Vec::new();
        for fk in existing {
            if !found && fk.matches(desired) {
                found = true;
            } else {
                drop.push(fk.name.clone());
            }
        }
        Self {
            drop,
            create: !found,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.drop.is_empty() && !self.create
    }
}

/// Applies a [`ReconcilePlan`].
#[derive(Debug, Clone, Default)]
pub struct ForeignKeyReconciler {
    mutator: SchemaMutator,
}

impl ForeignKeyReconciler {
    pub fn new(mutator: SchemaMutator) -> Self {
        Self { mutator }
    }

    /// Returns `true` if the desired key was created.
    ///
    /// Stale keys are dropped through the soft-failure path; creating the
    /// desired key is fatal on failure.
    pub async fn reconcile(&self, cur: &mut Cursor<'_>, desired: &ForeignKeyBinding) -> Result<bool> {
        let existing = self
            .mutator
            .inspector()
            .foreign_keys_from(cur, &desired.source_table, &desired.source_column)
            .await?;
        let plan = ReconcilePlan::compute(&existing, desired);

        if plan.is_noop() {
            debug!(
                target: SCHEMA_TARGET,
                table = %desired.source_table, column = %desired.source_column,
                "Table {:?}: foreign key on {:?} already up to date",
                desired.source_table, desired.source_column
            );
            return Ok(false);
        }

        for name in &plan.drop {
            self.mutator
                .drop_constraint(cur, &desired.source_table, name)
                .await?;
        }

        if !plan.create {
            return Ok(false);
        }
        self.mutator
            .add_foreign_key(
                cur,
                &desired.source_table,
                &desired.source_column,
                &desired.target_table,
                &desired.target_column,
                desired.on_delete,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgshift_core::schema::OnDelete;

    fn fk(name: &str, table: &str, on_delete: OnDelete) -> ExistingForeignKey {
        ExistingForeignKey {
            name: name.into(),
            target_table: table.into(),
            target_column: "id".into(),
            on_delete,
        }
    }

    fn desired() -> ForeignKeyBinding {
        ForeignKeyBinding::new("sale_order", "partner_id", "res_partner", "id", OnDelete::SetNull)
    }

    #[test]
    fn test_no_existing_key_creates() {
        let plan = ReconcilePlan::compute(&[], &desired());
        assert_eq!(plan, ReconcilePlan { drop: vec![], create: true });
    }

    #[test]
    fn test_matching_key_is_kept() {
        let existing = vec![fk("sale_order_partner_id_fkey", "res_partner", OnDelete::SetNull)];
        let plan = ReconcilePlan::compute(&existing, &desired());
        assert!(plan.is_noop());
    }

    #[test]
    fn test_stale_keys_are_dropped_and_recreated() {
        let existing = vec![
            fk("fk_a", "res_company", OnDelete::Cascade),
            fk("fk_b", "res_users", OnDelete::NoAction),
        ];
        let plan = ReconcilePlan::compute(&existing, &desired());
        assert_eq!(plan.drop, vec!["fk_a".to_string(), "fk_b".to_string()]);
        assert!(plan.create);
    }

    #[test]
    fn test_wrong_on_delete_is_stale() {
        let existing = vec![fk("fk_a", "res_partner", OnDelete::Cascade)];
        let plan = ReconcilePlan::compute(&existing, &desired());
        assert_eq!(plan.drop, vec!["fk_a".to_string()]);
        assert!(plan.create);
    }

    #[test]
    fn test_duplicates_of_desired_key_are_pruned() {
        let existing = vec![
            fk("fk_a", "res_company", OnDelete::Cascade),
            fk("fk_b", "res_partner", OnDelete::SetNull),
            fk("fk_c", "res_partner", OnDelete::SetNull),
        ];
        let plan = ReconcilePlan::compute(&existing, &desired());
        assert_eq!(plan.drop, vec!["fk_a".to_string(), "fk_c".to_string()]);
        assert!(!plan.create);
    }
}
