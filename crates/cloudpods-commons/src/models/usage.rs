//! Usage metering models: point-in-time samples and daily aggregates.

use crate::ids::{PodId, TenantId};
use crate::serialization::Storable;
use crate::storage_key::{decode_key, encode_key};
use crate::StorageKey;
use bincode::{Decode, Encode};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Immutable point-in-time resource consumption reading for one pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct UsageSample {
    pub tenant_id: TenantId,
    pub pod_id: PodId,
    /// Sampling instant, epoch ms.
    pub sampled_at: i64,
    pub cpu_pct: f64,
    pub memory_mb: f64,
    /// Disk is a gauge: current allocation, not a delta.
    pub disk_gb: f64,
    pub net_in_mb: f64,
    pub net_out_mb: f64,
}

/// Primary key of a sample: `(pod_id, sampled_at)`.
///
/// One sampler tick produces at most one sample per pod, so the pair is
/// unique; the encoding keeps one pod's samples contiguous and time-ordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleKey {
    pub pod_id: PodId,
    pub sampled_at: i64,
}

impl SampleKey {
    pub fn new(pod_id: PodId, sampled_at: i64) -> Self {
        Self { pod_id, sampled_at }
    }
}

impl StorageKey for SampleKey {
    fn storage_key(&self) -> Vec<u8> {
        encode_key(&(self.pod_id.as_str(), self.sampled_at))
    }

    fn from_storage_key(bytes: &[u8]) -> Result<Self, String> {
        let (pod, ts): (String, i64) = decode_key(bytes)?;
        Ok(Self::new(PodId::new(pod), ts))
    }
}

/// Derived daily aggregate, identity `(tenant_id, pod_id, date)`.
///
/// Idempotently recomputable: re-running the rollup for the same key
/// overwrites this row, it never appends a second one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageDaily {
    pub tenant_id: TenantId,
    pub pod_id: PodId,
    pub date: NaiveDate,
    pub avg_cpu_pct: f64,
    pub max_cpu_pct: f64,
    pub avg_memory_mb: f64,
    /// Latest sample's gauge value for the day, not a sum.
    pub disk_gb: f64,
    pub total_net_in_mb: f64,
    pub total_net_out_mb: f64,
    pub sample_count: u64,
    pub computed_at: i64,
}

/// Primary key of a daily rollup row: `(tenant_id, pod_id, date)`.
///
/// The date encodes as `YYYY-MM-DD`, which sorts chronologically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RollupKey {
    pub tenant_id: TenantId,
    pub pod_id: PodId,
    pub date: NaiveDate,
}

impl RollupKey {
    pub fn new(tenant_id: TenantId, pod_id: PodId, date: NaiveDate) -> Self {
        Self {
            tenant_id,
            pod_id,
            date,
        }
    }
}

impl StorageKey for RollupKey {
    fn storage_key(&self) -> Vec<u8> {
        let date = self.date.format("%Y-%m-%d").to_string();
        encode_key(&(self.tenant_id.as_str(), self.pod_id.as_str(), date.as_str()))
    }

    fn from_storage_key(bytes: &[u8]) -> Result<Self, String> {
        let (tenant, pod, date): (String, String, String) = decode_key(bytes)?;
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|e| format!("invalid rollup date: {}", e))?;
        Ok(Self::new(TenantId::new(tenant), PodId::new(pod), date))
    }
}

// Storable implementations for EntityStore support
impl Storable for UsageSample {}
impl Storable for UsageDaily {}
