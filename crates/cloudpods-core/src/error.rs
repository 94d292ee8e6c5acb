//! Error types for the orchestration core.

use crate::dns::DnsError;
use crate::hypervisor::HypervisorError;
use crate::transport::TransportError;
use cloudpods_store::StorageError;
use cloudpods_system::SystemError;
use thiserror::Error;

/// Main error type for the orchestration core.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("System error: {0}")]
    System(#[from] SystemError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid transition for {resource}: {from} -> {to}")]
    InvalidTransition {
        resource: String,
        from: String,
        to: String,
    },

    #[error("Hypervisor error: {0}")]
    Hypervisor(#[from] HypervisorError),

    #[error("DNS error: {0}")]
    Dns(#[from] DnsError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Payload error: {0}")]
    Payload(String),

    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Whether a retry could plausibly succeed. Permanent classes (bad
    /// payloads, rejected requests, illegal transitions) never clear on
    /// their own; everything else is worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::System(e) => !matches!(
                e,
                SystemError::NotFound(_)
                    | SystemError::AlreadyExists(_)
                    | SystemError::InvalidOperation(_)
                    | SystemError::InvalidTransition { .. }
            ),
            CoreError::Hypervisor(e) => e.is_transient(),
            CoreError::Dns(e) => e.is_transient(),
            CoreError::Storage(_) | CoreError::Transport(_) | CoreError::Other(_) => true,
            CoreError::NotFound(_)
            | CoreError::Conflict(_)
            | CoreError::InvalidOperation(_)
            | CoreError::InvalidTransition { .. }
            | CoreError::Payload(_) => false,
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Payload(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(
            CoreError::Hypervisor(HypervisorError::Unavailable("host unreachable".to_string()))
                .is_transient()
        );
        assert!(
            !CoreError::Hypervisor(HypervisorError::Rejected("unknown plan".to_string()))
                .is_transient()
        );
        assert!(
            CoreError::Transport(TransportError::Failed("connection reset".to_string()))
                .is_transient()
        );
        assert!(!CoreError::Payload("missing pod_id".to_string()).is_transient());
        assert!(!CoreError::InvalidTransition {
            resource: "pod".to_string(),
            from: "deleting".to_string(),
            to: "active".to_string(),
        }
        .is_transient());
    }

    #[test]
    fn test_system_transition_error_is_permanent() {
        let err = CoreError::System(SystemError::InvalidTransition {
            resource: "pod".to_string(),
            from: "deleting".to_string(),
            to: "active".to_string(),
        });
        assert!(!err.is_transient());
        assert!(CoreError::System(SystemError::Storage("disk".to_string())).is_transient());
    }

    #[test]
    fn test_system_error_converts() {
        let err: CoreError = SystemError::NotFound("job".to_string()).into();
        assert!(matches!(err, CoreError::System(_)));
    }
}
