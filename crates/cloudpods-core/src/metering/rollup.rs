//! Daily usage rollups.

use crate::error::Result;
use crate::webhooks::WebhookPublisher;
use chrono::{NaiveDate, NaiveTime};
use cloudpods_commons::models::{EventType, UsageDaily};
use cloudpods_commons::{now_millis, PodId, TenantId};
use cloudpods_system::{PodsProvider, UsageDailyProvider, UsageSamplesProvider};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Aggregates one UTC day of samples per pod into a single `UsageDaily` row.
///
/// The write is an upsert keyed `(tenant_id, pod_id, date)`: recomputing a
/// day replaces the previous aggregate, which is how late samples and
/// post-fix re-triggers are absorbed without double billing.
pub struct UsageRollup {
    pods: Arc<PodsProvider>,
    samples: Arc<UsageSamplesProvider>,
    daily: Arc<UsageDailyProvider>,
    webhooks: Arc<WebhookPublisher>,
}

/// Millisecond bounds of one UTC day, `[start, end)`.
fn day_bounds(date: NaiveDate) -> (i64, i64) {
    let start = date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
    let end = match date.succ_opt() {
        Some(next) => next.and_time(NaiveTime::MIN).and_utc().timestamp_millis(),
        None => i64::MAX,
    };
    (start, end)
}

impl UsageRollup {
    pub fn new(
        pods: Arc<PodsProvider>,
        samples: Arc<UsageSamplesProvider>,
        daily: Arc<UsageDailyProvider>,
        webhooks: Arc<WebhookPublisher>,
    ) -> Self {
        Self {
            pods,
            samples,
            daily,
            webhooks,
        }
    }

    /// Recompute one pod's aggregate for `date`.
    ///
    /// Averages cpu and memory, takes the day's maximum cpu, sums network
    /// transfer, and carries the latest disk gauge. A day with no samples
    /// writes nothing and returns `None`.
    pub fn rollup_day(
        &self,
        tenant_id: &TenantId,
        pod_id: &PodId,
        date: NaiveDate,
    ) -> Result<Option<UsageDaily>> {
        let (start, end) = day_bounds(date);
        let samples = self.samples.samples_for_pod_in_range(pod_id, start, end)?;
        if samples.is_empty() {
            return Ok(None);
        }

        let mut cpu_sum = 0.0;
        let mut max_cpu = f64::MIN;
        let mut mem_sum = 0.0;
        let mut disk_gb = 0.0;
        let mut net_in = 0.0;
        let mut net_out = 0.0;
        for sample in &samples {
            cpu_sum += sample.cpu_pct;
            max_cpu = max_cpu.max(sample.cpu_pct);
            mem_sum += sample.memory_mb;
            // Samples come back time-ordered, so the last assignment is the
            // day's latest gauge reading
            disk_gb = sample.disk_gb;
            net_in += sample.net_in_mb;
            net_out += sample.net_out_mb;
        }

        let count = samples.len();
        let row = UsageDaily {
            tenant_id: tenant_id.clone(),
            pod_id: pod_id.clone(),
            date,
            avg_cpu_pct: cpu_sum / count as f64,
            max_cpu_pct: max_cpu,
            avg_memory_mb: mem_sum / count as f64,
            disk_gb,
            total_net_in_mb: net_in,
            total_net_out_mb: net_out,
            sample_count: count as u64,
            computed_at: now_millis(),
        };
        self.daily.upsert(row.clone())?;
        Ok(Some(row))
    }

    /// Roll up `date` for every pod and publish one `usage.daily_rollup`
    /// event per tenant that got rows. Returns the number of rows written.
    pub async fn rollup_all_for_date(&self, date: NaiveDate) -> Result<usize> {
        let pods = self.pods.list_all()?;
        let mut per_tenant: BTreeMap<TenantId, usize> = BTreeMap::new();

        for pod in pods {
            if self
                .rollup_day(&pod.tenant_id, &pod.pod_id, date)?
                .is_some()
            {
                *per_tenant.entry(pod.tenant_id).or_insert(0) += 1;
            }
        }

        let total: usize = per_tenant.values().sum();
        for (tenant_id, pod_count) in &per_tenant {
            self.webhooks
                .publish(
                    tenant_id,
                    EventType::UsageDailyRollup,
                    json!({
                        "date": date.format("%Y-%m-%d").to_string(),
                        "podCount": pod_count,
                    }),
                )
                .await?;
        }

        if total > 0 {
            log::info!(
                "Rollup for {} wrote {} rows across {} tenants",
                date,
                total,
                per_tenant.len()
            );
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::test_app_context;
    use cloudpods_commons::models::{Pod, PodStatus, RollupKey, UsageSample, Webhook};
    use cloudpods_commons::WebhookId;

    fn seed_pod(app_ctx: &Arc<crate::app_context::AppContext>, id: &str, tenant: &str) -> Pod {
        let now = now_millis();
        app_ctx
            .system()
            .pods()
            .create_pod(Pod {
                pod_id: PodId::new(id),
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

    fn seed_sample(
        app_ctx: &Arc<crate::app_context::AppContext>,
        pod: &Pod,
        sampled_at: i64,
        cpu_pct: f64,
        disk_gb: f64,
    ) {
        app_ctx
            .system()
            .usage_samples()
            .insert_sample(UsageSample {
                tenant_id: pod.tenant_id.clone(),
                pod_id: pod.pod_id.clone(),
                sampled_at,
                cpu_pct,
                memory_mb: 512.0,
                disk_gb,
                net_in_mb: 10.0,
                net_out_mb: 5.0,
            })
            .unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 24).unwrap()
    }

    fn ms(date: NaiveDate, hour: u32) -> i64 {
        date.and_hms_opt(hour, 0, 0).unwrap().and_utc().timestamp_millis()
    }

    #[tokio::test]
    async fn test_rollup_aggregates_one_day() {
        let app_ctx = test_app_context();
        let rollup = app_ctx.rollup();
        let pod = seed_pod(&app_ctx, "pod-1", "t1");
        let date = day();

        seed_sample(&app_ctx, &pod, ms(date, 1), 10.0, 8.0);
        seed_sample(&app_ctx, &pod, ms(date, 12), 50.0, 9.0);
        seed_sample(&app_ctx, &pod, ms(date, 23), 30.0, 12.0);
        // Next day's sample must not leak in
        let next = date.succ_opt().unwrap();
        seed_sample(&app_ctx, &pod, ms(next, 1), 99.0, 99.0);

        let row = rollup
            .rollup_day(&pod.tenant_id, &pod.pod_id, date)
            .unwrap()
            .unwrap();
        assert_eq!(row.avg_cpu_pct, 30.0);
        assert_eq!(row.max_cpu_pct, 50.0);
        assert_eq!(row.disk_gb, 12.0);
        assert_eq!(row.total_net_in_mb, 30.0);
        assert_eq!(row.total_net_out_mb, 15.0);
        assert_eq!(row.sample_count, 3);
    }

    #[tokio::test]
    async fn test_recompute_overwrites_never_appends() {
        let app_ctx = test_app_context();
        let rollup = app_ctx.rollup();
        let pod = seed_pod(&app_ctx, "pod-1", "t1");
        let date = day();
        seed_sample(&app_ctx, &pod, ms(date, 1), 10.0, 8.0);

        let first = rollup
            .rollup_day(&pod.tenant_id, &pod.pod_id, date)
            .unwrap()
            .unwrap();

        // Late sample lands, rollup re-triggered
        seed_sample(&app_ctx, &pod, ms(date, 2), 30.0, 8.0);
        let second = rollup
            .rollup_day(&pod.tenant_id, &pod.pod_id, date)
            .unwrap()
            .unwrap();
        assert_eq!(first.avg_cpu_pct, 10.0);
        assert_eq!(second.avg_cpu_pct, 20.0);
        assert_eq!(second.sample_count, 2);

        let history = app_ctx
            .system()
            .usage_daily()
            .list_for_pod(&pod.tenant_id, &pod.pod_id)
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_recompute_same_inputs_same_aggregates() {
        let app_ctx = test_app_context();
        let rollup = app_ctx.rollup();
        let pod = seed_pod(&app_ctx, "pod-1", "t1");
        let date = day();
        seed_sample(&app_ctx, &pod, ms(date, 1), 10.0, 8.0);
        seed_sample(&app_ctx, &pod, ms(date, 2), 20.0, 9.0);

        let first = rollup
            .rollup_day(&pod.tenant_id, &pod.pod_id, date)
            .unwrap()
            .unwrap();
        let second = rollup
            .rollup_day(&pod.tenant_id, &pod.pod_id, date)
            .unwrap()
            .unwrap();

        assert_eq!(first.avg_cpu_pct, second.avg_cpu_pct);
        assert_eq!(first.max_cpu_pct, second.max_cpu_pct);
        assert_eq!(first.avg_memory_mb, second.avg_memory_mb);
        assert_eq!(first.disk_gb, second.disk_gb);
        assert_eq!(first.total_net_in_mb, second.total_net_in_mb);
        assert_eq!(first.total_net_out_mb, second.total_net_out_mb);
        assert_eq!(first.sample_count, second.sample_count);
    }

    #[tokio::test]
    async fn test_empty_day_writes_nothing() {
        let app_ctx = test_app_context();
        let rollup = app_ctx.rollup();
        let pod = seed_pod(&app_ctx, "pod-1", "t1");

        let row = rollup
            .rollup_day(&pod.tenant_id, &pod.pod_id, day())
            .unwrap();
        assert!(row.is_none());

        let key = RollupKey::new(pod.tenant_id.clone(), pod.pod_id.clone(), day());
        assert!(app_ctx.system().usage_daily().get_rollup(&key).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rollup_all_covers_suspended_pods_and_notifies_tenants() {
        let app_ctx = test_app_context();
        let rollup = app_ctx.rollup();
        let date = day();

        let pod_a = seed_pod(&app_ctx, "pod-a", "t1");
        let pod_b = seed_pod(&app_ctx, "pod-b", "t1");
        let pod_c = seed_pod(&app_ctx, "pod-c", "t2");
        // Suspended mid-day: its morning samples still bill
        app_ctx
            .system()
            .pods()
            .transition(&pod_b.pod_id, PodStatus::Suspended, ms(date, 12))
            .unwrap();

        seed_sample(&app_ctx, &pod_a, ms(date, 1), 10.0, 8.0);
        seed_sample(&app_ctx, &pod_b, ms(date, 2), 20.0, 8.0);
        seed_sample(&app_ctx, &pod_c, ms(date, 3), 30.0, 8.0);

        let now = now_millis();
        for (n, tenant) in ["t1", "t2"].iter().enumerate() {
            app_ctx
                .system()
                .webhooks()
                .create_webhook(Webhook {
                    webhook_id: WebhookId::new(format!("wh-{}", n)),
                    tenant_id: TenantId::new(*tenant),
                    url: "http://endpoint.test/hook".to_string(),
                    secret: "s3cret".to_string(),
                    events: vec!["usage.daily_rollup".to_string()],
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                })
                .unwrap();
        }

        let written = rollup.rollup_all_for_date(date).await.unwrap();
        assert_eq!(written, 3);

        let t1_deliveries = app_ctx
            .system()
            .deliveries()
            .list_for_webhook(&WebhookId::new("wh-0"))
            .unwrap();
        assert_eq!(t1_deliveries.len(), 1);
        assert!(t1_deliveries[0].body.contains("2026-08-24"));
        assert!(t1_deliveries[0].body.contains("\"podCount\":2"));

        let t2_deliveries = app_ctx
            .system()
            .deliveries()
            .list_for_webhook(&WebhookId::new("wh-1"))
            .unwrap();
        assert_eq!(t2_deliveries.len(), 1);
    }
}
