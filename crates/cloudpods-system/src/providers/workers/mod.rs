//! Workers table module (workers in RocksDB)

pub mod workers_provider;

pub use workers_provider::{WorkersProvider, WorkersStore};
