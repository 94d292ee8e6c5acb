//! Settings module (runtime overrides in RocksDB)

pub mod settings_provider;

pub use settings_provider::{SettingsProvider, SettingsStore};
