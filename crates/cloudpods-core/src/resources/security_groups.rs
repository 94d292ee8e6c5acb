//! Security group management.
//!
//! Pods and groups are related only through assignment rows: attaching and
//! detaching touch the join table, and deleting a group cascades its
//! assignments while leaving every pod row untouched. Membership changes
//! are published to subscribers and recorded on the tenant's audit chain.

use crate::audit::AuditRecorder;
use crate::error::{CoreError, Result};
use crate::webhooks::WebhookPublisher;
use cloudpods_commons::ids::prefixed_id;
use cloudpods_commons::models::{
    EventType, Pod, SecurityGroup, SecurityGroupAssignment, SecurityGroupRule,
};
use cloudpods_commons::{now_millis, PodId, SecurityGroupId, TenantId};
use cloudpods_system::{AssignmentsProvider, PodsProvider, SecurityGroupsProvider};
use serde_json::json;
use std::sync::Arc;

/// Name given to the lazily created per-tenant default group.
const DEFAULT_GROUP_NAME: &str = "default";

pub struct SecurityGroupService {
    groups: Arc<SecurityGroupsProvider>,
    assignments: Arc<AssignmentsProvider>,
    pods: Arc<PodsProvider>,
    webhooks: Arc<WebhookPublisher>,
    audit: Arc<AuditRecorder>,
}

impl SecurityGroupService {
    pub fn new(
        groups: Arc<SecurityGroupsProvider>,
        assignments: Arc<AssignmentsProvider>,
        pods: Arc<PodsProvider>,
        webhooks: Arc<WebhookPublisher>,
        audit: Arc<AuditRecorder>,
    ) -> Self {
        Self {
            groups,
            assignments,
            pods,
            webhooks,
            audit,
        }
    }

    /// Create a group. The provider rejects a second default for the tenant.
    pub fn create_group(
        &self,
        tenant_id: &TenantId,
        name: &str,
        is_default: bool,
        rules: Vec<SecurityGroupRule>,
    ) -> Result<SecurityGroup> {
        let now = now_millis();
        let group = self.groups.create_group(SecurityGroup {
            group_id: SecurityGroupId::new(prefixed_id("SG")),
            tenant_id: tenant_id.clone(),
            name: name.to_string(),
            is_default,
            rules,
            created_at: now,
            updated_at: now,
        })?;
        self.audit.record_system(
            tenant_id,
            "security_group.created",
            "security_group",
            group.group_id.as_str(),
            Some(json!({"name": group.name, "default": group.is_default})),
        )?;
        Ok(group)
    }

    pub fn get_group(&self, group_id: &SecurityGroupId) -> Result<SecurityGroup> {
        self.groups
            .get_group(group_id)?
            .ok_or_else(|| CoreError::NotFound(format!("Security group not found: {}", group_id)))
    }

    pub fn list_groups(&self, tenant_id: &TenantId) -> Result<Vec<SecurityGroup>> {
        Ok(self.groups.list_by_tenant(tenant_id)?)
    }

    /// Replace a group's rule list. Rules apply to every assigned pod.
    pub fn update_rules(
        &self,
        group_id: &SecurityGroupId,
        rules: Vec<SecurityGroupRule>,
    ) -> Result<SecurityGroup> {
        let group = self.groups.update_rules(group_id, rules, now_millis())?;
        self.audit.record_system(
            &group.tenant_id,
            "security_group.rules_updated",
            "security_group",
            group.group_id.as_str(),
            Some(json!({"rule_count": group.rules.len()})),
        )?;
        Ok(group)
    }

    /// Attach a group to a pod.
    ///
    /// Idempotent: an existing assignment is returned without another event
    /// or audit record. Cross-tenant attachment is rejected.
    pub async fn attach(
        &self,
        pod_id: &PodId,
        group_id: &SecurityGroupId,
    ) -> Result<SecurityGroupAssignment> {
        let pod = self.require_pod(pod_id)?;
        let group = self.get_group(group_id)?;
        if pod.tenant_id != group.tenant_id {
            return Err(CoreError::InvalidOperation(format!(
                "Security group {} belongs to tenant {}, pod {} to tenant {}",
                group_id, group.tenant_id, pod_id, pod.tenant_id
            )));
        }

        if self.assignments.is_assigned(pod_id, group_id)? {
            return Ok(self.assignments.assign(pod_id, group_id, now_millis())?);
        }

        let assignment = self.assignments.assign(pod_id, group_id, now_millis())?;
        self.publish_membership(&pod, &group, EventType::SecurityGroupAttached)
            .await?;
        self.audit.record_system(
            &pod.tenant_id,
            "security_group.attached",
            "pod",
            pod_id.as_str(),
            Some(json!({"group_id": group_id.as_str(), "group_name": group.name})),
        )?;
        Ok(assignment)
    }

    /// Detach a group from a pod. Detaching an absent assignment is a no-op.
    pub async fn detach(&self, pod_id: &PodId, group_id: &SecurityGroupId) -> Result<()> {
        if !self.assignments.is_assigned(pod_id, group_id)? {
            return Ok(());
        }
        let pod = self.require_pod(pod_id)?;
        let group = self.get_group(group_id)?;

        self.assignments.unassign(pod_id, group_id)?;
        self.publish_membership(&pod, &group, EventType::SecurityGroupDetached)
            .await?;
        self.audit.record_system(
            &pod.tenant_id,
            "security_group.detached",
            "pod",
            pod_id.as_str(),
            Some(json!({"group_id": group_id.as_str(), "group_name": group.name})),
        )?;
        Ok(())
    }

    /// Ensure the pod carries its tenant's default group.
    ///
    /// The default group is created lazily the first time a tenant
    /// provisions a pod; re-running against an assigned pod changes nothing.
    pub async fn ensure_default_assigned(&self, pod: &Pod) -> Result<SecurityGroup> {
        let group = match self.groups.find_default(&pod.tenant_id)? {
            Some(group) => group,
            None => self.create_group(&pod.tenant_id, DEFAULT_GROUP_NAME, true, Vec::new())?,
        };
        if !self.assignments.is_assigned(&pod.pod_id, &group.group_id)? {
            self.assignments
                .assign(&pod.pod_id, &group.group_id, now_millis())?;
            self.publish_membership(pod, &group, EventType::SecurityGroupAttached)
                .await?;
        }
        Ok(group)
    }

    /// Delete a group, cascading its assignments. Pods are never deleted or
    /// transitioned by this; each affected pod just loses the membership.
    /// Returns the number of assignments removed.
    pub async fn delete_group(&self, group_id: &SecurityGroupId) -> Result<usize> {
        let group = self.get_group(group_id)?;
        if group.is_default {
            return Err(CoreError::InvalidOperation(format!(
                "Cannot delete default security group {} of tenant {}",
                group_id, group.tenant_id
            )));
        }

        let affected = self.assignments.list_pods_for_group(group_id)?;
        let cascaded = self.assignments.delete_all_for_group(group_id)?;
        self.groups.delete_group(group_id)?;

        for pod_id in &affected {
            if let Some(pod) = self.pods.get_pod(pod_id)? {
                self.publish_membership(&pod, &group, EventType::SecurityGroupDetached)
                    .await?;
            }
        }
        self.audit.record_system(
            &group.tenant_id,
            "security_group.deleted",
            "security_group",
            group_id.as_str(),
            Some(json!({"name": group.name, "cascaded_assignments": cascaded})),
        )?;
        log::info!(
            "Deleted security group {} ({} assignment(s) cascaded)",
            group_id,
            cascaded
        );
        Ok(cascaded)
    }

    /// Groups currently assigned to the pod.
    pub fn list_groups_for_pod(&self, pod_id: &PodId) -> Result<Vec<SecurityGroup>> {
        let ids = self.assignments.list_groups_for_pod(pod_id)?;
        let mut groups = Vec::with_capacity(ids.len());
        for group_id in ids {
            if let Some(group) = self.groups.get_group(&group_id)? {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    /// Remove every assignment the pod holds, without events. Used by pod
    /// deletion, where the pod.deleted event already tells the story.
    pub fn clear_assignments_for_pod(&self, pod_id: &PodId) -> Result<usize> {
        Ok(self.assignments.delete_all_for_pod(pod_id)?)
    }

    fn require_pod(&self, pod_id: &PodId) -> Result<Pod> {
        self.pods
            .get_pod(pod_id)?
            .ok_or_else(|| CoreError::NotFound(format!("Pod not found: {}", pod_id)))
    }

    async fn publish_membership(
        &self,
        pod: &Pod,
        group: &SecurityGroup,
        event_type: EventType,
    ) -> Result<()> {
        self.webhooks
            .publish(
                &pod.tenant_id,
                event_type,
                json!({
                    "podId": pod.pod_id.as_str(),
                    "groupId": group.group_id.as_str(),
                    "groupName": group.name,
                }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_context::AppContext;
    use crate::test_helpers::test_app_context;
    use cloudpods_commons::models::{
        PodStatus, RuleDirection, RuleProtocol, Webhook,
    };
    use cloudpods_commons::WebhookId;

    fn seed_pod(app_ctx: &Arc<AppContext>, pod_id: &str, tenant: &str) -> Pod {
        let now = now_millis();
        app_ctx
            .system()
            .pods()
            .create_pod(Pod {
                pod_id: PodId::new(pod_id),
                tenant_id: TenantId::new(tenant),
                plan_code: "small".to_string(),
                template: "debian-12".to_string(),
                status: PodStatus::Active,
                instance_id: None,
                ip_address: None,
                primary_domain: None,
                created_at: now,
                updated_at: now,
            })
            .unwrap()
    }

    fn seed_subscriber(app_ctx: &Arc<AppContext>, tenant: &str) -> Webhook {
        let now = now_millis();
        app_ctx
            .system()
            .webhooks()
            .create_webhook(Webhook {
                webhook_id: WebhookId::new("wh-sg"),
                tenant_id: TenantId::new(tenant),
                url: "http://endpoint.test/hook".to_string(),
                secret: "s3cret".to_string(),
                events: vec!["*".to_string()],
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .unwrap()
    }

    fn ingress_rule(port: u16) -> SecurityGroupRule {
        SecurityGroupRule {
            direction: RuleDirection::Ingress,
            protocol: RuleProtocol::Tcp,
            port_min: port,
            port_max: port,
            cidr: "0.0.0.0/0".to_string(),
        }
    }

    fn deliveries_for(app_ctx: &Arc<AppContext>, webhook: &Webhook) -> usize {
        app_ctx
            .system()
            .deliveries()
            .list_for_webhook(&webhook.webhook_id)
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn test_attach_detach_round_trip() {
        let app_ctx = test_app_context();
        let service = app_ctx.security_groups();
        let pod = seed_pod(&app_ctx, "pod-1", "t1");
        let webhook = seed_subscriber(&app_ctx, "t1");
        let tenant = TenantId::new("t1");

        let group = service
            .create_group(&tenant, "web", false, vec![ingress_rule(443)])
            .unwrap();

        service.attach(&pod.pod_id, &group.group_id).await.unwrap();
        assert!(app_ctx
            .system()
            .assignments()
            .is_assigned(&pod.pod_id, &group.group_id)
            .unwrap());
        assert_eq!(deliveries_for(&app_ctx, &webhook), 1);

        // Re-attach is a no-op: no second assignment, no second event
        service.attach(&pod.pod_id, &group.group_id).await.unwrap();
        assert_eq!(deliveries_for(&app_ctx, &webhook), 1);

        service.detach(&pod.pod_id, &group.group_id).await.unwrap();
        assert!(!app_ctx
            .system()
            .assignments()
            .is_assigned(&pod.pod_id, &group.group_id)
            .unwrap());
        assert_eq!(deliveries_for(&app_ctx, &webhook), 2);

        // Detach of an absent assignment is silent
        service.detach(&pod.pod_id, &group.group_id).await.unwrap();
        assert_eq!(deliveries_for(&app_ctx, &webhook), 2);
    }

    #[tokio::test]
    async fn test_attach_rejects_cross_tenant() {
        let app_ctx = test_app_context();
        let service = app_ctx.security_groups();
        let pod = seed_pod(&app_ctx, "pod-1", "t1");
        let group = service
            .create_group(&TenantId::new("t2"), "other", false, Vec::new())
            .unwrap();

        let err = service.attach(&pod.pod_id, &group.group_id).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation(_)));
        assert!(!app_ctx
            .system()
            .assignments()
            .is_assigned(&pod.pod_id, &group.group_id)
            .unwrap());
    }

    #[tokio::test]
    async fn test_ensure_default_lazily_creates_once() {
        let app_ctx = test_app_context();
        let service = app_ctx.security_groups();
        let pod_a = seed_pod(&app_ctx, "pod-a", "t1");
        let pod_b = seed_pod(&app_ctx, "pod-b", "t1");

        let first = service.ensure_default_assigned(&pod_a).await.unwrap();
        assert!(first.is_default);
        assert_eq!(first.name, "default");

        // Second pod reuses the same group; re-running changes nothing
        let second = service.ensure_default_assigned(&pod_b).await.unwrap();
        assert_eq!(first.group_id, second.group_id);
        service.ensure_default_assigned(&pod_a).await.unwrap();

        assert_eq!(service.list_groups(&TenantId::new("t1")).unwrap().len(), 1);
        assert!(app_ctx
            .system()
            .assignments()
            .is_assigned(&pod_a.pod_id, &first.group_id)
            .unwrap());
        assert!(app_ctx
            .system()
            .assignments()
            .is_assigned(&pod_b.pod_id, &first.group_id)
            .unwrap());
    }

    #[tokio::test]
    async fn test_second_default_rejected() {
        let app_ctx = test_app_context();
        let service = app_ctx.security_groups();
        let tenant = TenantId::new("t1");

        service.create_group(&tenant, "default", true, Vec::new()).unwrap();
        let err = service
            .create_group(&tenant, "default-2", true, Vec::new())
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_delete_group_cascades_assignments_not_pods() {
        let app_ctx = test_app_context();
        let service = app_ctx.security_groups();
        let pod_a = seed_pod(&app_ctx, "pod-a", "t1");
        let pod_b = seed_pod(&app_ctx, "pod-b", "t1");
        let webhook = seed_subscriber(&app_ctx, "t1");
        let tenant = TenantId::new("t1");

        let group = service
            .create_group(&tenant, "web", false, vec![ingress_rule(80)])
            .unwrap();
        service.attach(&pod_a.pod_id, &group.group_id).await.unwrap();
        service.attach(&pod_b.pod_id, &group.group_id).await.unwrap();

        let cascaded = service.delete_group(&group.group_id).await.unwrap();
        assert_eq!(cascaded, 2);
        assert!(matches!(
            service.get_group(&group.group_id).unwrap_err(),
            CoreError::NotFound(_)
        ));

        // Both pods survive with their status intact
        for pod_id in [&pod_a.pod_id, &pod_b.pod_id] {
            let pod = app_ctx.system().pods().get_pod(pod_id).unwrap().unwrap();
            assert_eq!(pod.status, PodStatus::Active);
            assert!(service.list_groups_for_pod(pod_id).unwrap().is_empty());
        }

        // Two attached events plus one detached per affected pod
        assert_eq!(deliveries_for(&app_ctx, &webhook), 4);
    }

    #[tokio::test]
    async fn test_delete_default_group_rejected() {
        let app_ctx = test_app_context();
        let service = app_ctx.security_groups();
        let pod = seed_pod(&app_ctx, "pod-1", "t1");

        let group = service.ensure_default_assigned(&pod).await.unwrap();
        let err = service.delete_group(&group.group_id).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation(_)));
        assert!(service.get_group(&group.group_id).is_ok());
    }

    #[tokio::test]
    async fn test_update_rules_replaces_list() {
        let app_ctx = test_app_context();
        let service = app_ctx.security_groups();
        let tenant = TenantId::new("t1");

        let group = service
            .create_group(&tenant, "web", false, vec![ingress_rule(80)])
            .unwrap();
        let updated = service
            .update_rules(&group.group_id, vec![ingress_rule(80), ingress_rule(443)])
            .unwrap();
        assert_eq!(updated.rules.len(), 2);
        assert_eq!(updated.rules[1].port_min, 443);
    }
}
