//! Worker coordinator, split by concern: construction and shared state in
//! `types`, the claim/execute loop in `runner`, enqueue and cancel in
//! `actions`, read paths in `queries`.

mod actions;
mod queries;
mod runner;
mod types;
mod utils;


pub use types::WorkerCoordinator;
