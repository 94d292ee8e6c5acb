//! Storage key trait for type-safe key serialization with lexicographic ordering.
//!
//! Uses the `storekey` crate to guarantee that serialized keys sort in the
//! same order as their source values. The storage engine iterates keys
//! byte-by-byte, so naive encodings (length prefixes, raw struct dumps)
//! silently break range scans on composite keys.
//!
//! Composite keys encode as tuples:
//!
//! ```rust,ignore
//! impl StorageKey for SampleKey {
//!     fn storage_key(&self) -> Vec<u8> {
//!         encode_key(&(self.pod_id.as_str(), self.sampled_at))
//!     }
//!
//!     fn from_storage_key(bytes: &[u8]) -> Result<Self, String> {
//!         let (pod, ts): (String, i64) = decode_key(bytes)?;
//!         Ok(Self { pod_id: PodId::new(pod), sampled_at: ts })
//!     }
//! }
//! ```

use storekey::{Decode, Encode};

/// Encode a value to bytes using storekey's order-preserving format.
///
/// The encoded bytes sort in the same order as the original values when
/// compared lexicographically. Supported types include primitives, strings,
/// options, tuples, and vecs.
pub fn encode_key<T: Encode>(value: &T) -> Vec<u8> {
    storekey::encode_vec(value).expect("storekey encoding should not fail for valid types")
}

/// Encode a value as a prefix for range scans.
///
/// Identical to `encode_key`, named for intent: for tuple keys like
/// `(pod_id, sampled_at)`, encode just `(pod_id,)` to scan one pod's rows.
pub fn encode_prefix<T: Encode>(value: &T) -> Vec<u8> {
    encode_key(value)
}

/// Decode a value from storekey-encoded bytes.
pub fn decode_key<T: Decode>(bytes: &[u8]) -> Result<T, String> {
    storekey::decode(&mut std::io::Cursor::new(bytes))
        .map_err(|e| format!("storekey decode error: {:?}", e))
}

/// Trait for keys that can be serialized for storage in an `EntityStore`.
///
/// Keys serialize via `storekey`, which preserves lexicographic ordering:
/// strings sort alphabetically, numbers numerically, tuples element-by-element.
/// Composite keys MUST return the full composite encoding from
/// `storage_key()`, never a single component.
pub trait StorageKey: Clone + Send + Sync + 'static {
    /// Serialize this key to bytes using order-preserving encoding.
    fn storage_key(&self) -> Vec<u8>;

    /// Deserialize this key from bytes.
    fn from_storage_key(bytes: &[u8]) -> Result<Self, String>
    where
        Self: Sized;
}

impl StorageKey for String {
    fn storage_key(&self) -> Vec<u8> {
        encode_key(&self.as_str())
    }

    fn from_storage_key(bytes: &[u8]) -> Result<Self, String> {
        decode_key(bytes)
    }
}

impl StorageKey for Vec<u8> {
    fn storage_key(&self) -> Vec<u8> {
        encode_key(self)
    }

    fn from_storage_key(bytes: &[u8]) -> Result<Self, String> {
        decode_key(bytes)
    }
}

impl StorageKey for u64 {
    fn storage_key(&self) -> Vec<u8> {
        encode_key(self)
    }

    fn from_storage_key(bytes: &[u8]) -> Result<Self, String> {
        decode_key(bytes)
    }
}

impl StorageKey for i64 {
    fn storage_key(&self) -> Vec<u8> {
        encode_key(self)
    }

    fn from_storage_key(bytes: &[u8]) -> Result<Self, String> {
        decode_key(bytes)
    }
}
