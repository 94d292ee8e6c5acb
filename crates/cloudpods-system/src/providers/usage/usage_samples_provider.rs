//! Usage samples provider.
//!
//! Samples are immutable and keyed `(pod_id, sampled_at)`, so one pod's
//! history is contiguous and time-ordered; the daily rollup reads a day with
//! a single bounded range scan.

use crate::error::SystemError;
use cloudpods_commons::models::{SampleKey, UsageSample};
use cloudpods_commons::{encode_prefix, PodId, Storable, StorageKey, StoragePartition};
use cloudpods_store::entity_store::EntityStore;
use cloudpods_store::{IndexedEntityStore, Partition, StorageBackend};
use std::sync::Arc;

/// Type alias for the usage samples store
pub type UsageSamplesStore = IndexedEntityStore<SampleKey, UsageSample>;

pub struct UsageSamplesProvider {
    store: UsageSamplesStore,
}

impl std::fmt::Debug for UsageSamplesProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageSamplesProvider").finish()
    }
}

impl UsageSamplesProvider {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let store = IndexedEntityStore::new(
            backend,
            StoragePartition::UsageSamples.name(),
            Vec::new(),
        );
        Self { store }
    }

    /// Record one sample. Writing the same `(pod, sampled_at)` twice
    /// overwrites, which keeps sampler restarts harmless.
    pub fn insert_sample(&self, sample: UsageSample) -> Result<(), SystemError> {
        let key = SampleKey::new(sample.pod_id.clone(), sample.sampled_at);
        self.store.put(&key, &sample)?;
        Ok(())
    }

    /// Record one sampler tick's readings in a single atomic batch.
    pub fn insert_samples(&self, samples: Vec<UsageSample>) -> Result<(), SystemError> {
        let entries: Vec<(SampleKey, UsageSample)> = samples
            .into_iter()
            .map(|s| (SampleKey::new(s.pod_id.clone(), s.sampled_at), s))
            .collect();
        self.store.batch_put(&entries)?;
        Ok(())
    }

    /// Samples for one pod with `start_inclusive <= sampled_at < end_exclusive`,
    /// in time order.
    pub fn samples_for_pod_in_range(
        &self,
        pod_id: &PodId,
        start_inclusive: i64,
        end_exclusive: i64,
    ) -> Result<Vec<UsageSample>, SystemError> {
        let partition = Partition::new(StoragePartition::UsageSamples.name());
        let prefix = encode_prefix(&(pod_id.as_str(),));
        let start = SampleKey::new(pod_id.clone(), start_inclusive).storage_key();

        let iter = self
            .store
            .backend()
            .scan(&partition, Some(&prefix), Some(&start), None)?;

        let mut samples = Vec::new();
        for (_key, value_bytes) in iter {
            let sample = UsageSample::decode(&value_bytes)?;
            // Time-ordered within the pod prefix
            if sample.sampled_at >= end_exclusive {
                break;
            }
            samples.push(sample);
        }
        Ok(samples)
    }

    /// Delete samples older than `cutoff_ms`. Returns the number deleted.
    pub fn cleanup_old_samples(&self, cutoff_ms: i64) -> Result<usize, SystemError> {
        let entries = self.store.scan_all(None, None, None)?;
        let mut deleted = 0;
        for (_key, sample) in entries {
            if sample.sampled_at < cutoff_ms {
                let key = SampleKey::new(sample.pod_id.clone(), sample.sampled_at);
                self.store.delete(&key)?;
                deleted += 1;
            }
        }
        if deleted > 0 {
            log::info!("Sample retention sweep deleted {} samples", deleted);
        }
        Ok(deleted)
    }
}
