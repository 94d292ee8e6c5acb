//! Shared error types for CloudPods.
//!
//! Basic error variants usable from any crate without external dependencies.
//! Layer-specific errors (`StorageError`, `SystemError`, `CoreError`) wrap or
//! convert from these where needed.

use std::fmt;

/// Common error type for CloudPods operations.
#[derive(Debug, Clone)]
pub enum CommonError {
    /// Invalid input provided to a function
    InvalidInput(String),

    /// Resource not found (pod, job, webhook, etc.)
    NotFound(String),

    /// Resource already exists (duplicate creation)
    AlreadyExists(String),

    /// Operation conflicts with in-flight state (idempotency key held,
    /// overlapping lifecycle intent)
    Conflict(String),

    /// Internal error (unexpected state)
    Internal(String),
}

impl CommonError {
    /// Creates an InvalidInput error with a message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates a NotFound error with a message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates an AlreadyExists error with a message.
    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    /// Creates a Conflict error with a message.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Creates an Internal error with a message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommonError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            CommonError::NotFound(msg) => write!(f, "Not found: {}", msg),
            CommonError::AlreadyExists(msg) => write!(f, "Already exists: {}", msg),
            CommonError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            CommonError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for CommonError {}

/// Result type alias using CommonError.
pub type Result<T> = std::result::Result<T, CommonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CommonError::invalid_input("test");
        assert!(matches!(err, CommonError::InvalidInput(_)));
        assert_eq!(err.to_string(), "Invalid input: test");

        let err = CommonError::not_found("pod_123");
        assert!(matches!(err, CommonError::NotFound(_)));
        assert_eq!(err.to_string(), "Not found: pod_123");

        let err = CommonError::conflict("heal already in flight");
        assert!(matches!(err, CommonError::Conflict(_)));
        assert_eq!(err.to_string(), "Conflict: heal already in flight");
    }

    #[test]
    fn test_result_type() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        assert_eq!(returns_ok().unwrap(), 42);
    }
}
