mod catalog;
mod foreign_key;

pub use catalog::{
    ColumnDescriptor, ColumnRef, ConstraintDescriptor, IndexDescriptor, TableDescriptor,
    TableKind, ViewDependency,
};
pub use foreign_key::{ExistingForeignKey, ForeignKeyBinding, OnDelete};
