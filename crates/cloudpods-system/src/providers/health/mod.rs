//! Health status module (health_status in RocksDB)

pub mod health_provider;

pub use health_provider::{HealthProvider, HealthStore};
