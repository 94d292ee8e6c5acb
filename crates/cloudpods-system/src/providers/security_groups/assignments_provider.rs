//! Security group assignment provider: the pod ↔ group join table.
//!
//! Rows are keyed `(pod_id, group_id)`, so one prefix scan answers "which
//! groups protect this pod". The reverse direction goes through the group
//! index keyed `(group_id, pod_id)`.

use crate::error::SystemError;
use cloudpods_commons::models::{AssignmentKey, SecurityGroupAssignment};
use cloudpods_commons::{encode_key, encode_prefix, PodId, SecurityGroupId, StoragePartition};
use cloudpods_store::entity_store::EntityStore;
use cloudpods_store::{IndexDefinition, IndexedEntityStore, StorageBackend};
use std::sync::Arc;

/// Index position for `AssignmentGroupIndex`.
pub const GROUP_INDEX: usize = 0;

/// Index: assignments by group. Key: `(group_id, pod_id)`.
pub struct AssignmentGroupIndex;

impl IndexDefinition<AssignmentKey, SecurityGroupAssignment> for AssignmentGroupIndex {
    fn partition(&self) -> &str {
        StoragePartition::SecurityGroupAssignmentsGroupIdx.name()
    }

    fn indexed_columns(&self) -> Vec<&str> {
        vec!["group_id", "pod_id"]
    }

    fn extract_key(
        &self,
        _pk: &AssignmentKey,
        assignment: &SecurityGroupAssignment,
    ) -> Option<Vec<u8>> {
        Some(encode_key(&(
            assignment.group_id.as_str(),
            assignment.pod_id.as_str(),
        )))
    }
}

/// Type alias for the indexed assignments store
pub type AssignmentsStore = IndexedEntityStore<AssignmentKey, SecurityGroupAssignment>;

pub struct AssignmentsProvider {
    store: AssignmentsStore,
}

impl std::fmt::Debug for AssignmentsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentsProvider").finish()
    }
}

impl AssignmentsProvider {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let store = IndexedEntityStore::new(
            backend,
            StoragePartition::SecurityGroupAssignments.name(),
            vec![Arc::new(AssignmentGroupIndex)
                as Arc<dyn IndexDefinition<AssignmentKey, SecurityGroupAssignment>>],
        );
        Self { store }
    }

    /// Attach a group to a pod. Idempotent: re-assigning an existing pair
    /// returns the original row, so provisioning retries are safe.
    pub fn assign(
        &self,
        pod_id: &PodId,
        group_id: &SecurityGroupId,
        now: i64,
    ) -> Result<SecurityGroupAssignment, SystemError> {
        let key = AssignmentKey::new(pod_id.clone(), group_id.clone());
        if let Some(existing) = self.store.get(&key)? {
            return Ok(existing);
        }
        let assignment = SecurityGroupAssignment {
            pod_id: pod_id.clone(),
            group_id: group_id.clone(),
            assigned_at: now,
        };
        self.store.insert(&key, &assignment)?;
        log::debug!("Assigned security group {} to pod {}", group_id, pod_id);
        Ok(assignment)
    }

    /// Detach a group from a pod. Idempotent.
    pub fn unassign(&self, pod_id: &PodId, group_id: &SecurityGroupId) -> Result<(), SystemError> {
        let key = AssignmentKey::new(pod_id.clone(), group_id.clone());
        self.store.delete(&key)?;
        Ok(())
    }

    pub fn is_assigned(
        &self,
        pod_id: &PodId,
        group_id: &SecurityGroupId,
    ) -> Result<bool, SystemError> {
        let key = AssignmentKey::new(pod_id.clone(), group_id.clone());
        Ok(self.store.exists(&key)?)
    }

    /// Groups attached to a pod, via one prefix scan over the join table.
    pub fn list_groups_for_pod(&self, pod_id: &PodId) -> Result<Vec<SecurityGroupId>, SystemError> {
        let prefix = encode_prefix(&(pod_id.as_str(),));
        let entries = self.store.scan_prefix_bytes(&prefix, None)?;
        Ok(entries.into_iter().map(|(_, a)| a.group_id).collect())
    }

    /// Pods a group is attached to, via the group index.
    pub fn list_pods_for_group(&self, group_id: &SecurityGroupId) -> Result<Vec<PodId>, SystemError> {
        let prefix = encode_prefix(&(group_id.as_str(),));
        let entries = self.store.scan_by_index(GROUP_INDEX, Some(&prefix), None)?;
        Ok(entries.into_iter().map(|(_, a)| a.pod_id).collect())
    }

    /// Cascade for group deletion: removes the group's assignment rows only.
    /// The pods keep running; they just lose this group's rules.
    pub fn delete_all_for_group(&self, group_id: &SecurityGroupId) -> Result<usize, SystemError> {
        let prefix = encode_prefix(&(group_id.as_str(),));
        let entries = self.store.scan_by_index(GROUP_INDEX, Some(&prefix), None)?;
        let count = entries.len();
        for (key, assignment) in &entries {
            self.store.delete_with_entity(key, assignment)?;
        }
        if count > 0 {
            log::info!(
                "Cascaded deletion of {} assignments for security group {}",
                count,
                group_id
            );
        }
        Ok(count)
    }

    /// Cascade for pod deletion: removes the pod's assignment rows.
    pub fn delete_all_for_pod(&self, pod_id: &PodId) -> Result<usize, SystemError> {
        let prefix = encode_prefix(&(pod_id.as_str(),));
        let entries = self.store.scan_prefix_bytes(&prefix, None)?;
        let mut count = 0;
        for (_, assignment) in entries {
            let key = AssignmentKey::new(assignment.pod_id.clone(), assignment.group_id.clone());
            self.store.delete_with_entity(&key, &assignment)?;
            count += 1;
        }
        Ok(count)
    }
}
