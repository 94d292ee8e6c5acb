//! Usage metering module (usage_samples + usage_daily in RocksDB)

pub mod usage_daily_provider;
pub mod usage_samples_provider;

pub use usage_daily_provider::{UsageDailyProvider, UsageDailyStore};
pub use usage_samples_provider::{UsageSamplesProvider, UsageSamplesStore};
