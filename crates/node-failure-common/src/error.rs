//! Error types shared across the control loop.

use thiserror::Error;

/// Domain/repository-facing error type.
#[derive(Error, Debug)]
pub enum NodeFailureError {
    /// No node with this hostname is known to the repository.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// The orchestrator has no record of this application.
    #[error("application not found: {0}")]
    ApplicationNotFound(String),

    /// A lock (application or unallocated) could not be acquired.
    #[error("lock conflict: {0}")]
    LockConflict(String),

    /// A collaborator RPC failed and the caller should retry next tick.
    #[error("repository unavailable: {0}")]
    RepositoryUnavailable(String),

    /// A state the data model declares impossible was observed.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A configuration value violates a construction-time constraint.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type for domain/repository operations.
pub type NodeFailureResult<T> = Result<T, NodeFailureError>;
