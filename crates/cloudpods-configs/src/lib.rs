//! cloudpods-configs
//!
//! Server configuration types and loader for CloudPods.

pub mod config;
pub mod file_helpers;

pub use config::defaults;
pub use config::*;
