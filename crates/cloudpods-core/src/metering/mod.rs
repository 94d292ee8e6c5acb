//! Usage metering: periodic sampling plus daily rollups.
//!
//! The sampler reads hypervisor counters for running pods and appends
//! immutable samples; the rollup aggregates one UTC day of samples per pod
//! into a single billing row. Both are driven by the scheduler, never by
//! the job queue: a missed tick is covered by the next one, and a rollup
//! can always be recomputed.

pub mod rollup;
pub mod sampler;

pub use rollup::UsageRollup;
pub use sampler::UsageSampler;
