use thiserror::Error;

/// Errors that can occur in provider operations
#[derive(Error, Debug)]
pub enum SystemError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Rejected lifecycle edge. The target row is left untouched; callers
    /// record the rejection in the audit trail.
    #[error("Illegal transition for {resource}: {from} -> {to}")]
    InvalidTransition {
        resource: String,
        from: String,
        to: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, SystemError>;

// Convert from cloudpods_store::StorageError
impl From<cloudpods_store::StorageError> for SystemError {
    fn from(err: cloudpods_store::StorageError) -> Self {
        SystemError::Storage(err.to_string())
    }
}
