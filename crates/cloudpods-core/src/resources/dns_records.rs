//! DNS record reconciliation.
//!
//! Same ensure semantics as the volume reconciler: retries converge on one
//! row per name, and registration failures are recorded on the row before
//! they propagate.

use crate::dns::DnsProvider;
use crate::error::Result;
use cloudpods_commons::ids::prefixed_id;
use cloudpods_commons::models::{DnsRecord, Pod, ResourceStatus};
use cloudpods_commons::{now_millis, DnsRecordId, PodId};
use cloudpods_system::DnsRecordsProvider;
use std::sync::Arc;

const DEFAULT_TTL: u32 = 300;

pub struct DnsReconciler {
    records: Arc<DnsRecordsProvider>,
    dns: Arc<dyn DnsProvider>,
}

impl DnsReconciler {
    pub fn new(records: Arc<DnsRecordsProvider>, dns: Arc<dyn DnsProvider>) -> Self {
        Self { records, dns }
    }

    /// Ensure `fqdn` points at `ip` and the pod owns an active row for it.
    ///
    /// An existing row for the name is reused; if the pod's address changed
    /// (fresh instance after a heal) the stale row is replaced and the name
    /// re-registered. Registration overwrites upstream, so re-running this
    /// is safe.
    pub async fn ensure_record(&self, pod: &Pod, fqdn: &str, ip: &str) -> Result<DnsRecord> {
        let existing = self
            .records
            .list_by_pod(&pod.pod_id)?
            .into_iter()
            .find(|r| r.fqdn == fqdn);

        let record = match existing {
            Some(record) if record.value == ip => {
                if record.status == ResourceStatus::Active {
                    return Ok(record);
                }
                record
            }
            Some(stale) => {
                // Address changed; replace the row so it reflects the target
                self.records.delete_record(&stale.record_id)?;
                self.create_row(pod, fqdn, ip)?
            }
            None => self.create_row(pod, fqdn, ip)?,
        };

        match self.dns.register(fqdn, ip).await {
            Ok(()) => {
                let active = self.records.set_status(
                    &record.record_id,
                    ResourceStatus::Active,
                    None,
                    now_millis(),
                )?;
                log::info!("DNS record {} -> {} active for pod {}", fqdn, ip, pod.pod_id);
                Ok(active)
            }
            Err(e) => {
                self.records.set_status(
                    &record.record_id,
                    ResourceStatus::Failed,
                    Some(e.to_string()),
                    now_millis(),
                )?;
                Err(e.into())
            }
        }
    }

    /// Deregister and delete every record the pod owns. Returns the number
    /// of rows removed.
    pub async fn remove_all_for_pod(&self, pod_id: &PodId) -> Result<usize> {
        let records = self.records.list_by_pod(pod_id)?;
        let mut removed = 0;
        for record in records {
            match self.dns.remove(&record.fqdn).await {
                Ok(()) => {}
                Err(e) if e.is_transient() => return Err(e.into()),
                Err(e) => {
                    log::warn!(
                        "DNS removal of {} rejected ({}); dropping row anyway",
                        record.fqdn,
                        e
                    );
                }
            }
            self.records.delete_record(&record.record_id)?;
            removed += 1;
        }
        if removed > 0 {
            log::info!("Removed {} DNS record(s) for pod {}", removed, pod_id);
        }
        Ok(removed)
    }

    pub fn list_for_pod(&self, pod_id: &PodId) -> Result<Vec<DnsRecord>> {
        Ok(self.records.list_by_pod(pod_id)?)
    }

    fn create_row(&self, pod: &Pod, fqdn: &str, ip: &str) -> Result<DnsRecord> {
        let now = now_millis();
        Ok(self.records.create_record(DnsRecord {
            record_id: DnsRecordId::new(prefixed_id("DR")),
            pod_id: pod.pod_id.clone(),
            fqdn: fqdn.to_string(),
            record_type: "A".to_string(),
            value: ip.to_string(),
            ttl: DEFAULT_TTL,
            status: ResourceStatus::Creating,
            last_error: None,
            created_at: now,
            updated_at: now,
        })?)
    }
}
