//! Pod sub-resource managers: volumes, DNS records, security groups.

pub mod dns_records;
pub mod security_groups;
pub mod volumes;

pub use dns_records::DnsReconciler;
pub use security_groups::SecurityGroupService;
pub use volumes::VolumeReconciler;
