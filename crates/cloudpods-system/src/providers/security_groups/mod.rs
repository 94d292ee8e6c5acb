//! Security groups module (security_groups + security_group_assignments in RocksDB)
//!
//! Two tables: the groups themselves and the pod ↔ group join table.

pub mod assignments_provider;
pub mod security_groups_provider;

pub use assignments_provider::{AssignmentGroupIndex, AssignmentsProvider, AssignmentsStore};
pub use security_groups_provider::{
    SecurityGroupTenantIndex, SecurityGroupsProvider, SecurityGroupsStore,
};
