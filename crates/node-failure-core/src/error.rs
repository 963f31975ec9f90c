//! Control-loop-level errors layered above `node_failure_common`'s
//! repository/domain error type, mirroring the teacher's split
//! between a broad domain error enum and narrower feature-local ones.

use thiserror::Error;

pub use node_failure_common::{NodeFailureError, NodeFailureResult};

/// Errors from the cascaded fail-active protocol. Deployer/orchestrator
/// rejections are ordinarily handled inline (returning `Ok(false)`,
/// per §4.4/§7) rather than surfaced here; this type exists for the
/// repository-shaped failures that genuinely cannot be worked around.
#[derive(Debug, Error)]
pub enum ControlLoopError {
    #[error(transparent)]
    Node(#[from] NodeFailureError),
}

pub type ControlLoopResult<T> = Result<T, ControlLoopError>;
