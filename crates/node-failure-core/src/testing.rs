//! In-memory reference implementations of every collaborator trait,
//! for the scenario/property tests in `tests/scenarios.rs` and for
//! downstream embedders doing local development. Mirrors the
//! teacher's `InMemoryPolicyRepository`/`InMemorySessionRepository`
//! pattern: a plain struct, lock-guarded `HashMap`, no persistence.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use node_failure_common::{EventType, HistoryEvent, Node, NodeFailureError, NodeFailureResult, NodeState, NodeType};
use parking_lot::RwLock;

use crate::collaborators::{
    ApplicationInstance, ApplicationInstanceStatus, Clock, Deployer, DeployerError, DeploymentHandle,
    JobControl, LivenessTracker, MonitorError, Orchestrator, OrchestratorError, ServiceCluster,
    ServiceInstance, ServiceMonitor, ServiceStatus,
};
use crate::repository::{LockGuard, NodeRepository};

/// A clock that only advances when told to, so the literal scenarios
/// in §8 ("advance 45 minutes", "advance 2 hours") can be expressed
/// without real sleeps.
pub struct FakeClock {
    current: RwLock<DateTime<Utc>>,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { current: RwLock::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.write();
        *current = *current + chrono::Duration::from_std(by).expect("duration fits in chrono range");
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.current.write() = at;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.read()
    }
}

/// In-memory node repository. One `tokio::sync::Mutex<()>` per
/// application id plus one for "unallocated", matching the spec's
/// locking model (§5).
pub struct InMemoryNodeRepository {
    nodes: RwLock<HashMap<String, Node>>,
    app_locks: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    unallocated_lock: Arc<tokio::sync::Mutex<()>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryNodeRepository {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            app_locks: parking_lot::Mutex::new(HashMap::new()),
            unallocated_lock: Arc::new(tokio::sync::Mutex::new(())),
            clock,
        }
    }

    pub fn seed(&self, node: Node) {
        self.nodes.write().insert(node.hostname.clone(), node);
    }

    pub fn snapshot(&self) -> Vec<Node> {
        self.nodes.read().values().cloned().collect()
    }

    pub fn get(&self, hostname: &str) -> Option<Node> {
        self.nodes.read().get(hostname).cloned()
    }

    async fn application_mutex(&self, application_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.app_locks
            .lock()
            .entry(application_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl NodeRepository for InMemoryNodeRepository {
    async fn get_nodes(&self, state: Option<NodeState>) -> NodeFailureResult<Vec<Node>> {
        Ok(self
            .nodes
            .read()
            .values()
            .filter(|n| state.map(|s| n.state == s).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn get_nodes_of_type(&self, node_type: NodeType, state: NodeState) -> NodeFailureResult<Vec<Node>> {
        Ok(self
            .nodes
            .read()
            .values()
            .filter(|n| n.node_type == node_type && n.state == state)
            .cloned()
            .collect())
    }

    async fn get_node(&self, hostname: &str) -> NodeFailureResult<Option<Node>> {
        Ok(self.nodes.read().get(hostname).cloned())
    }

    async fn get_child_nodes(&self, parent_hostname: &str) -> NodeFailureResult<Vec<Node>> {
        Ok(self
            .nodes
            .read()
            .values()
            .filter(|n| n.parent_hostname.as_deref() == Some(parent_hostname))
            .cloned()
            .collect())
    }

    async fn write(&self, node: Node) -> NodeFailureResult<()> {
        self.nodes.write().insert(node.hostname.clone(), node);
        Ok(())
    }

    async fn fail(&self, hostname: &str, agent: &str, reason: &str) -> NodeFailureResult<Node> {
        let now = self.clock.now();
        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(hostname).ok_or_else(|| NodeFailureError::NodeNotFound(hostname.to_string()))?;
        if node.state == NodeState::Failed {
            // Idempotent: already failed, only the reason replaces - the
            // fail count and failed-at timestamp must not move.
            tracing::debug!(hostname, reason, "repository: node already failed, reason replaced");
            return Ok(node.clone());
        }
        node.state = NodeState::Failed;
        node.status.fail_count += 1;
        node.record(HistoryEvent::new(EventType::Failed, agent, now));
        tracing::debug!(hostname, reason, "repository: node failed");
        Ok(node.clone())
    }

    async fn park(&self, hostname: &str, agent: &str, _reason: &str) -> NodeFailureResult<()> {
        let now = self.clock.now();
        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(hostname).ok_or_else(|| NodeFailureError::NodeNotFound(hostname.to_string()))?;
        node.state = NodeState::Parked;
        node.record(HistoryEvent::new(EventType::Parked, agent, now));
        Ok(())
    }

    async fn set_dirty(&self, hostnames: &[String]) -> NodeFailureResult<()> {
        let now = self.clock.now();
        let mut nodes = self.nodes.write();
        for hostname in hostnames {
            if let Some(node) = nodes.get_mut(hostname) {
                node.state = NodeState::Dirty;
                node.record(HistoryEvent::new(EventType::Dirtied, "failed-node-expirer", now));
            }
        }
        Ok(())
    }

    async fn reactivate(&self, hostname: &str, agent: &str) -> NodeFailureResult<()> {
        let now = self.clock.now();
        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(hostname).ok_or_else(|| NodeFailureError::NodeNotFound(hostname.to_string()))?;
        node.state = NodeState::Active;
        node.record(HistoryEvent::new(EventType::Activated, agent, now));
        Ok(())
    }

    async fn remove_recursively(&self, hostname: &str) -> NodeFailureResult<()> {
        let mut nodes = self.nodes.write();
        let children: Vec<String> = nodes
            .values()
            .filter(|n| n.parent_hostname.as_deref() == Some(hostname))
            .map(|n| n.hostname.clone())
            .collect();
        for child in children {
            nodes.remove(&child);
        }
        nodes.remove(hostname);
        Ok(())
    }

    async fn lock_application(&self, application_id: &str) -> NodeFailureResult<LockGuard> {
        let mutex = self.application_mutex(application_id).await;
        Ok(LockGuard(mutex.lock_owned().await))
    }

    async fn lock_unallocated(&self) -> NodeFailureResult<LockGuard> {
        Ok(LockGuard(self.unallocated_lock.clone().lock_owned().await))
    }
}

/// Scripted liveness tracker: test code calls `set_last_request` to
/// simulate heartbeats, or never calls it to simulate a dead host.
#[derive(Default)]
pub struct FakeLivenessTracker {
    last_request: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl FakeLivenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_last_request(&self, hostname: &str, at: DateTime<Utc>) {
        self.last_request.write().insert(hostname.to_string(), at);
    }
}

#[async_trait]
impl LivenessTracker for FakeLivenessTracker {
    async fn last_request_from(&self, hostname: &str) -> Option<DateTime<Utc>> {
        self.last_request.read().get(hostname).copied()
    }
}

/// Scripted service monitor: `app_id -> host_name -> status`, flattened
/// into one `ServiceCluster` per application on read.
#[derive(Default)]
pub struct FakeServiceMonitor {
    statuses: RwLock<HashMap<String, HashMap<String, ServiceStatus>>>,
    status_known: AtomicBool,
}

impl FakeServiceMonitor {
    pub fn new() -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
            status_known: AtomicBool::new(true),
        }
    }

    pub fn set_status(&self, application_id: &str, hostname: &str, status: ServiceStatus) {
        self.statuses
            .write()
            .entry(application_id.to_string())
            .or_default()
            .insert(hostname.to_string(), status);
    }

    pub fn set_status_known(&self, known: bool) {
        self.status_known.store(known, Ordering::SeqCst);
    }
}

#[async_trait]
impl ServiceMonitor for FakeServiceMonitor {
    async fn get_all_application_instances(&self) -> Result<HashMap<String, ApplicationInstance>, MonitorError> {
        Ok(self
            .statuses
            .read()
            .iter()
            .map(|(application_id, hosts)| {
                let service_instances = hosts
                    .iter()
                    .map(|(host_name, status)| ServiceInstance { host_name: host_name.clone(), status: *status })
                    .collect();
                (application_id.clone(), ApplicationInstance { service_clusters: vec![ServiceCluster { service_instances }] })
            })
            .collect())
    }

    fn status_is_known(&self) -> bool {
        self.status_known.load(Ordering::SeqCst)
    }
}

/// Scripted orchestrator: applications absent from the map are
/// reported as not-found, exercising the "unknown application" path.
#[derive(Default)]
pub struct FakeOrchestrator {
    statuses: RwLock<HashMap<String, ApplicationInstanceStatus>>,
}

impl FakeOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, application_id: &str, status: ApplicationInstanceStatus) {
        self.statuses.write().insert(application_id.to_string(), status);
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn get_application_instance_status(&self, application_id: &str) -> Result<ApplicationInstanceStatus, OrchestratorError> {
        self.statuses
            .read()
            .get(application_id)
            .copied()
            .ok_or_else(|| OrchestratorError::ApplicationIdNotFound(application_id.to_string()))
    }
}

struct FakeDeploymentHandle {
    application_id: String,
    fails: bool,
    redeployments: Arc<RwLock<Vec<String>>>,
}

#[async_trait]
impl DeploymentHandle for FakeDeploymentHandle {
    async fn activate(&self) -> Result<(), DeployerError> {
        if self.fails {
            return Err(DeployerError::ActivationFailed(self.application_id.clone(), "simulated capacity shortfall".into()));
        }
        self.redeployments.write().push(self.application_id.clone());
        Ok(())
    }
}

/// Scripted deployer: per-application control over whether a handle
/// is granted at all (simulating "another replica owns this") and
/// whether the returned handle's `activate()` succeeds.
#[derive(Default)]
pub struct FakeDeployer {
    unavailable: RwLock<HashSet<String>>,
    activation_fails: RwLock<HashSet<String>>,
    redeployments: Arc<RwLock<Vec<String>>>,
}

impl FakeDeployer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, application_id: &str, unavailable: bool) {
        if unavailable {
            self.unavailable.write().insert(application_id.to_string());
        } else {
            self.unavailable.write().remove(application_id);
        }
    }

    pub fn set_activation_fails(&self, application_id: &str, fails: bool) {
        if fails {
            self.activation_fails.write().insert(application_id.to_string());
        } else {
            self.activation_fails.write().remove(application_id);
        }
    }

    pub fn redeployments(&self) -> Vec<String> {
        self.redeployments.read().clone()
    }

    pub fn redeployment_count(&self) -> usize {
        self.redeployments.read().len()
    }
}

#[async_trait]
impl Deployer for FakeDeployer {
    async fn deploy_from_local_active(&self, application_id: &str, _timeout: Duration) -> Option<Box<dyn DeploymentHandle>> {
        if self.unavailable.read().contains(application_id) {
            return None;
        }
        Some(Box::new(FakeDeploymentHandle {
            application_id: application_id.to_string(),
            fails: self.activation_fails.read().contains(application_id),
            redeployments: self.redeployments.clone(),
        }))
    }
}

/// Job-control gate that is open unless a job name is explicitly closed.
#[derive(Default)]
pub struct FakeJobControl {
    closed: RwLock<HashSet<String>>,
}

impl FakeJobControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self, job_name: &str) {
        self.closed.write().insert(job_name.to_string());
    }

    pub fn open(&self, job_name: &str) {
        self.closed.write().remove(job_name);
    }
}

impl JobControl for FakeJobControl {
    fn is_allowed(&self, job_name: &str) -> bool {
        !self.closed.read().contains(job_name)
    }
}
