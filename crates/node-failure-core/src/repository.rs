//! Node repository contract: the persistent store with transactional
//! locks per application and an "unallocated" lock. Only the trait
//! lives here; an in-memory reference implementation is in
//! `testing.rs`, used by both the crate's own tests and downstream
//! embedders for local development.

use async_trait::async_trait;
use node_failure_common::{Node, NodeFailureResult, NodeState, NodeType};

/// RAII guard for either the unallocated lock or one application's
/// lock. Dropping it releases the lock. Concrete rather than an
/// associated type so `NodeRepository` stays object-safe
/// (`Arc<dyn NodeRepository>` is how every collaborator is passed
/// around).
pub struct LockGuard(pub(crate) tokio::sync::OwnedMutexGuard<()>);

#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// All nodes, optionally filtered to one state.
    async fn get_nodes(&self, state: Option<NodeState>) -> NodeFailureResult<Vec<Node>>;

    /// Nodes of a given type and state, used by `failAllowedFor`.
    async fn get_nodes_of_type(&self, node_type: NodeType, state: NodeState) -> NodeFailureResult<Vec<Node>>;

    async fn get_node(&self, hostname: &str) -> NodeFailureResult<Option<Node>>;

    async fn get_child_nodes(&self, parent_hostname: &str) -> NodeFailureResult<Vec<Node>>;

    /// Read-modify-write a node record. Callers must hold the
    /// relevant lock and must have re-read the node under that lock
    /// before calling this.
    async fn write(&self, node: Node) -> NodeFailureResult<()>;

    /// Idempotent from an already-failed state - the reason replaces.
    async fn fail(&self, hostname: &str, agent: &str, reason: &str) -> NodeFailureResult<Node>;

    async fn park(&self, hostname: &str, agent: &str, reason: &str) -> NodeFailureResult<()>;

    async fn set_dirty(&self, hostnames: &[String]) -> NodeFailureResult<()>;

    async fn reactivate(&self, hostname: &str, agent: &str) -> NodeFailureResult<()>;

    async fn remove_recursively(&self, hostname: &str) -> NodeFailureResult<()>;

    async fn lock_application(&self, application_id: &str) -> NodeFailureResult<LockGuard>;

    async fn lock_unallocated(&self) -> NodeFailureResult<LockGuard>;
}
