//! Serialization trait for values stored in an `EntityStore`.

use bincode::config::standard;
use serde::{Deserialize, Serialize};

use crate::storage::StorageError;

type Result<T> = std::result::Result<T, StorageError>;

/// Trait implemented by values that can be stored in an `EntityStore`.
///
/// The default implementation uses bincode's serde bridge, so plain
/// `Serialize`/`Deserialize` derives are enough. Types can override
/// `encode`/`decode` for custom storage formats.
///
/// ## Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use cloudpods_commons::serialization::Storable;
///
/// #[derive(Serialize, Deserialize)]
/// struct MyEntity {
///     id: String,
///     value: i64,
/// }
///
/// impl Storable for MyEntity {}
/// ```
pub trait Storable: Serialize + for<'de> Deserialize<'de> + Send + Sync {
    fn encode(&self) -> Result<Vec<u8>> {
        let config = standard();
        bincode::serde::encode_to_vec(self, config)
            .map_err(|e| StorageError::SerializationError(format!("bincode encode failed: {}", e)))
    }

    fn decode(bytes: &[u8]) -> Result<Self>
    where
        Self: Sized,
    {
        let config = standard();
        bincode::serde::decode_from_slice(bytes, config)
            .map(|(entity, _)| entity)
            .map_err(|e| StorageError::SerializationError(format!("bincode decode failed: {}", e)))
    }
}

// Blanket implementation for String (common storage type)
impl Storable for String {}
