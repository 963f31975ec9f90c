//! End-to-end scenarios exercising the full control loop against the
//! in-memory collaborators from `testing`, rather than any single
//! phase in isolation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use node_failure_common::{Allocation, Flavor, Node, NodeState, NodeType, ThrottlePolicy};
use node_failure_core::testing::{FakeClock, FakeDeployer, FakeLivenessTracker, FakeOrchestrator, FakeServiceMonitor, InMemoryNodeRepository};
use node_failure_core::{
    ApplicationInstanceStatus, Environment, ExpirerConfig, FailedNodeExpirer, Maintainer, NodeFailer,
    NodeFailerConfig, NodeRepository, ServiceStatus,
};

fn ready_node(hostname: &str) -> Node {
    let mut node = Node::new(hostname, NodeType::Tenant, Flavor::Other);
    node.state = NodeState::Ready;
    node
}

fn active_node(hostname: &str, application_id: &str) -> Node {
    let mut node = Node::new(hostname, NodeType::Tenant, Flavor::Other);
    node.state = NodeState::Active;
    node.allocation = Some(Allocation { application_id: application_id.to_string(), membership_index: 0 });
    node
}

struct Harness {
    repository: Arc<InMemoryNodeRepository>,
    liveness: Arc<FakeLivenessTracker>,
    monitor: Arc<FakeServiceMonitor>,
    orchestrator: Arc<FakeOrchestrator>,
    deployer: Arc<FakeDeployer>,
    clock: Arc<FakeClock>,
    failer: NodeFailer,
}

impl Harness {
    fn new(config: NodeFailerConfig) -> Self {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let repository = Arc::new(InMemoryNodeRepository::new(clock.clone()));
        let liveness = Arc::new(FakeLivenessTracker::new());
        let monitor = Arc::new(FakeServiceMonitor::new());
        let orchestrator = Arc::new(FakeOrchestrator::new());
        let deployer = Arc::new(FakeDeployer::new());
        let failer = NodeFailer::try_new(
            repository.clone(),
            liveness.clone(),
            monitor.clone(),
            orchestrator.clone(),
            deployer.clone(),
            clock.clone(),
            config,
        )
        .expect("valid config");
        Self { repository, liveness, monitor, orchestrator, deployer, clock, failer }
    }
}

fn default_config() -> NodeFailerConfig {
    NodeFailerConfig {
        interval: Duration::from_secs(5 * 60),
        down_time_limit: Duration::from_secs(60 * 60),
        node_request_interval: Duration::from_secs(10 * 60),
        throttle_policy: ThrottlePolicy::disabled(),
    }
}

#[tokio::test]
async fn ready_nodes_with_hardware_signals_are_failed() {
    let harness = Harness::new(default_config());

    let mut sick = ready_node("ready-1");
    sick.status.hardware_failure_description = Some("disk SMART error".into());
    harness.repository.seed(sick);

    let mut diverged = ready_node("ready-2");
    diverged.status.hardware_divergence = Some("unexpected kernel version".into());
    harness.repository.seed(diverged);

    let healthy = ready_node("ready-3");
    harness.repository.seed(healthy);

    harness.failer.step().await.expect("step succeeds");

    assert_eq!(harness.repository.get("ready-1").unwrap().state, NodeState::Failed);
    assert_eq!(harness.repository.get("ready-2").unwrap().state, NodeState::Failed);
    assert_eq!(harness.repository.get("ready-3").unwrap().state, NodeState::Ready);
}

#[tokio::test]
async fn active_node_down_past_grace_triggers_single_redeployment() {
    let harness = Harness::new(default_config());

    harness.repository.seed(active_node("host-a", "app-1"));
    harness.orchestrator.set_status("app-1", ApplicationInstanceStatus::NoRemarks);
    harness.monitor.set_status("app-1", "host-a", ServiceStatus::Down);

    harness.failer.step().await.expect("step records down");
    assert!(harness.repository.get("host-a").unwrap().state == NodeState::Active);

    harness.clock.advance(Duration::from_secs(61 * 60));
    harness.failer.step().await.expect("step fails the node");

    assert_eq!(harness.repository.get("host-a").unwrap().state, NodeState::Failed);
    assert_eq!(harness.deployer.redeployment_count(), 1);

    // A further tick must not redeploy again - the node is no longer active.
    harness.clock.advance(Duration::from_secs(61 * 60));
    harness.failer.step().await.expect("step is a no-op now");
    assert_eq!(harness.deployer.redeployment_count(), 1);
}

#[tokio::test]
async fn monitor_blackout_preserves_state_until_restored() {
    let harness = Harness::new(default_config());

    harness.repository.seed(active_node("host-b", "app-2"));
    harness.orchestrator.set_status("app-2", ApplicationInstanceStatus::NoRemarks);
    harness.monitor.set_status("app-2", "host-b", ServiceStatus::Down);
    harness.failer.step().await.expect("down recorded");

    harness.monitor.set_status_known(false);
    harness.clock.advance(Duration::from_secs(2 * 60 * 60));
    harness.failer.step().await.expect("step during blackout is a no-op");
    assert_eq!(harness.repository.get("host-b").unwrap().state, NodeState::Active, "blackout must not fail the node");

    harness.monitor.set_status_known(true);
    harness.failer.step().await.expect("step after restoration fails the node");
    assert_eq!(harness.repository.get("host-b").unwrap().state, NodeState::Failed);
}

#[tokio::test]
async fn host_cascade_fails_active_tenant_children_before_the_host() {
    let harness = Harness::new(default_config());

    let mut host = Node::new("host-c", NodeType::Host, Flavor::Other);
    host.state = NodeState::Active;
    host.allocation = Some(Allocation { application_id: "host-app".to_string(), membership_index: 0 });
    harness.repository.seed(host);

    let mut child_a = active_node("container-a", "tenant-app-1");
    child_a.flavor = Flavor::DockerContainer;
    child_a.parent_hostname = Some("host-c".to_string());
    harness.repository.seed(child_a);

    let mut child_b = active_node("container-b", "tenant-app-2");
    child_b.flavor = Flavor::DockerContainer;
    child_b.parent_hostname = Some("host-c".to_string());
    harness.repository.seed(child_b);

    harness.orchestrator.set_status("host-app", ApplicationInstanceStatus::NoRemarks);
    harness.orchestrator.set_status("tenant-app-1", ApplicationInstanceStatus::NoRemarks);
    harness.orchestrator.set_status("tenant-app-2", ApplicationInstanceStatus::NoRemarks);

    let outcome = harness
        .failer
        .fail_active("host-c".to_string(), "host-app".to_string(), "maintenance".to_string())
        .await
        .expect("cascade completes");

    assert!(outcome, "cascade should succeed when all activations succeed");
    assert_eq!(harness.repository.get("host-c").unwrap().state, NodeState::Failed);
    assert_eq!(harness.repository.get("container-a").unwrap().state, NodeState::Failed);
    assert_eq!(harness.repository.get("container-b").unwrap().state, NodeState::Failed);
    assert_eq!(harness.deployer.redeployment_count(), 3);
}

#[tokio::test]
async fn host_cascade_aborts_and_rolls_back_a_failed_child_activation() {
    // A single child keeps the outcome independent of the (HashMap-backed,
    // unordered) child iteration in `get_child_nodes`.
    let harness = Harness::new(default_config());

    let mut host = Node::new("host-d", NodeType::Host, Flavor::Other);
    host.state = NodeState::Active;
    host.allocation = Some(Allocation { application_id: "host-app-2".to_string(), membership_index: 0 });
    harness.repository.seed(host);

    let mut child = active_node("container-d", "tenant-app-4");
    child.flavor = Flavor::DockerContainer;
    child.parent_hostname = Some("host-d".to_string());
    harness.repository.seed(child);

    harness.orchestrator.set_status("host-app-2", ApplicationInstanceStatus::NoRemarks);
    harness.orchestrator.set_status("tenant-app-4", ApplicationInstanceStatus::NoRemarks);
    harness.deployer.set_activation_fails("tenant-app-4", true);

    let outcome = harness
        .failer
        .fail_active("host-d".to_string(), "host-app-2".to_string(), "maintenance".to_string())
        .await
        .expect("cascade completes without erroring");

    assert!(!outcome, "cascade must abort once a child activation fails");
    assert_eq!(harness.repository.get("container-d").unwrap().state, NodeState::Active, "failed activation rolls the child back to active");
    assert_eq!(harness.repository.get("host-d").unwrap().state, NodeState::Active, "host is never reached once a child aborts the cascade");
    assert_eq!(harness.deployer.redeployment_count(), 0);
}

#[tokio::test]
async fn expirer_parks_a_hardware_failed_host_only_once_every_child_is_parked() {
    use node_failure_common::{EventType, HistoryEvent};

    let clock = Arc::new(FakeClock::new(Utc::now()));
    let repository = Arc::new(InMemoryNodeRepository::new(clock.clone()));

    let mut host = Node::new("host-e", NodeType::Host, Flavor::Other);
    host.state = NodeState::Failed;
    host.status.hardware_failure_description = Some("PSU failure".into());
    host.record(HistoryEvent::new(EventType::Failed, "test", clock.now()));
    repository.seed(host);

    let mut child_a = Node::new("container-e", NodeType::Tenant, Flavor::DockerContainer);
    child_a.parent_hostname = Some("host-e".to_string());
    child_a.state = NodeState::Failed;
    repository.seed(child_a);

    let mut child_b = Node::new("container-f", NodeType::Tenant, Flavor::DockerContainer);
    child_b.parent_hostname = Some("host-e".to_string());
    child_b.state = NodeState::Active;
    repository.seed(child_b);

    let config = ExpirerConfig { interval: Duration::from_secs(30 * 60), fail_timeout: Duration::from_secs(60 * 60), environment: Environment::Production };
    let expirer = FailedNodeExpirer::new(repository.clone(), clock.clone(), config);

    clock.advance(Duration::from_secs(61 * 60));
    expirer.step().await.expect("step succeeds");
    assert_eq!(repository.get("host-e").unwrap().state, NodeState::Failed, "one active child still blocks the park");

    repository.park("container-f", "test", "draining").await.expect("park the remaining child");
    expirer.step().await.expect("step succeeds");
    assert_eq!(repository.get("host-e").unwrap().state, NodeState::Parked, "all children parked now unblocks the host park");
}

#[tokio::test]
async fn expirer_recycles_expired_failed_nodes_without_a_hardware_signal() {
    let clock = Arc::new(FakeClock::new(Utc::now()));
    let repository = Arc::new(InMemoryNodeRepository::new(clock.clone()));
    repository.seed(harness_failed_node(&clock, "worn-node-1"));

    let config = ExpirerConfig { interval: Duration::from_secs(30 * 60), fail_timeout: Duration::from_secs(60 * 60), environment: Environment::Production };
    let expirer = FailedNodeExpirer::new(repository.clone(), clock.clone(), config);

    clock.advance(Duration::from_secs(61 * 60));
    expirer.step().await.expect("step succeeds");

    assert_eq!(repository.get("worn-node-1").unwrap().state, NodeState::Dirty);
}

fn harness_failed_node(clock: &Arc<FakeClock>, hostname: &str) -> Node {
    use node_failure_common::{EventType, HistoryEvent};
    let mut node = Node::new(hostname, NodeType::Tenant, Flavor::Other);
    node.state = NodeState::Failed;
    node.record(HistoryEvent::new(EventType::Failed, "test", clock.now()));
    node
}
