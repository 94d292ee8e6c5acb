//! DNS records table module (dns_records in RocksDB)

pub mod dns_records_provider;

pub use dns_records_provider::{DnsRecordPodIndex, DnsRecordsProvider, DnsRecordsStore};
