//! Volumes table module (volumes in RocksDB)

pub mod volumes_provider;

pub use volumes_provider::{VolumePodIndex, VolumesProvider, VolumesStore};
