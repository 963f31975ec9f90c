//! The node failer: the main decision loop. Four phases per tick (§4.3)
//! plus the cascaded fail-active protocol (§4.4).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use node_failure_common::{
    EventType, HistoryEvent, Node, NodeFailureError, NodeFailureResult, NodeState, NodeType,
    ThrottlePolicy,
};
use serde::{Deserialize, Serialize};

use crate::collaborators::{
    ApplicationInstanceStatus, Clock, Deployer, LivenessTracker, Orchestrator, OrchestratorError,
    ServiceMonitor, ServiceStatus,
};
use crate::error::ControlLoopResult;
use crate::repository::NodeRepository;
use crate::scheduler::Maintainer;
use crate::throttle;

const AGENT: &str = "node-failer";

/// Tunables from §6. `interval` is the maintainer cadence this failer
/// will be scheduled at and is validated against `down_time_limit` in
/// `NodeFailer::try_new` (§4.1: `interval ≤ min(downTimeLimit/2, 5m)`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NodeFailerConfig {
    pub interval: Duration,
    pub down_time_limit: Duration,
    pub node_request_interval: Duration,
    pub throttle_policy: ThrottlePolicy,
}

impl Default for NodeFailerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            down_time_limit: Duration::from_secs(60 * 60),
            node_request_interval: Duration::from_secs(10 * 60),
            throttle_policy: ThrottlePolicy::production_default(),
        }
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub struct NodeFailer {
    repository: Arc<dyn NodeRepository>,
    liveness: Arc<dyn LivenessTracker>,
    monitor: Arc<dyn ServiceMonitor>,
    orchestrator: Arc<dyn Orchestrator>,
    deployer: Arc<dyn Deployer>,
    clock: Arc<dyn Clock>,
    config: NodeFailerConfig,
    /// Per-instance grace window anchor (§9: not process-global;
    /// re-instantiating the failer resets this, intentionally).
    constructed_at: DateTime<Utc>,
}

impl NodeFailer {
    pub fn try_new(
        repository: Arc<dyn NodeRepository>,
        liveness: Arc<dyn LivenessTracker>,
        monitor: Arc<dyn ServiceMonitor>,
        orchestrator: Arc<dyn Orchestrator>,
        deployer: Arc<dyn Deployer>,
        clock: Arc<dyn Clock>,
        config: NodeFailerConfig,
    ) -> NodeFailureResult<Self> {
        let five_minutes = Duration::from_secs(5 * 60);
        let max_interval = (config.down_time_limit / 2).min(five_minutes);
        if config.interval > max_interval {
            return Err(NodeFailureError::InvalidConfig(format!(
                "interval {:?} exceeds min(downTimeLimit/2, 5m) = {:?}",
                config.interval, max_interval
            )));
        }
        let constructed_at = clock.now();
        Ok(Self {
            repository,
            liveness,
            monitor,
            orchestrator,
            deployer,
            clock,
            config,
            constructed_at,
        })
    }

    /// Phase A: lazily write a fresh `requested` event for ready nodes
    /// that have checked in more recently than their recorded event.
    async fn phase_a_liveness_bookkeeping(&self) -> NodeFailureResult<()> {
        let _guard = self.repository.lock_unallocated().await?;
        let ready_nodes = self.repository.get_nodes(Some(NodeState::Ready)).await?;
        for node in ready_nodes {
            let Some(last_request) = self.liveness.last_request_from(&node.hostname).await else {
                continue;
            };
            let stale = match node.event_at(EventType::Requested) {
                Some(previous) => last_request > previous,
                None => true,
            };
            if stale {
                let mut updated = node;
                updated.record(HistoryEvent::new(EventType::Requested, "liveness-tracker", last_request));
                self.repository.write(updated).await?;
            }
        }
        Ok(())
    }

    /// Phase B: fail ready nodes that are dead, hardware-faulted, or
    /// hardware-divergent, each gated by the throttle individually. Each
    /// ready node yields at most one fail decision per tick, even when it
    /// matches more than one condition - `ready_nodes` is a snapshot, so a
    /// node already failed earlier in this phase must not be re-failed.
    async fn phase_b_fail_dead_or_faulted(&self) -> NodeFailureResult<()> {
        let now = self.clock.now();
        let ready_nodes = self.repository.get_nodes(Some(NodeState::Ready)).await?;

        let grace_elapsed = now - self.constructed_at > to_chrono(self.config.node_request_interval) * 2;
        let check_in_deadline = now - to_chrono(self.config.down_time_limit) - to_chrono(self.config.node_request_interval);

        for node in &ready_nodes {
            let reason = if grace_elapsed && !node.is_container() && node.node_type != NodeType::Host && self.is_dead(node, check_in_deadline) {
                Some("Not receiving config requests from node")
            } else if node.status.hardware_failure_description.is_some() {
                Some("Node has hardware failure")
            } else if node.status.hardware_divergence.is_some() {
                Some("Node hardware diverges from spec")
            } else {
                None
            };

            let Some(reason) = reason else { continue };
            self.try_fail_ready(node, reason).await?;
        }
        Ok(())
    }

    fn is_dead(&self, node: &Node, check_in_deadline: DateTime<Utc>) -> bool {
        let readied_in_time = match node.event_at(EventType::Readied) {
            Some(readied_at) => readied_at < check_in_deadline,
            None => false,
        };
        if !readied_in_time {
            return false;
        }
        let checked_in_recently = match node.event_at(EventType::Requested) {
            Some(requested_at) => requested_at > check_in_deadline,
            None => false,
        };
        !checked_in_recently
    }

    async fn try_fail_ready(&self, node: &Node, reason: &str) -> NodeFailureResult<()> {
        let all_nodes = self.repository.get_nodes(None).await?;
        if throttle::is_throttled(&self.config.throttle_policy, &all_nodes, self.clock.now()) {
            tracing::info!(hostname = %node.hostname, policy = ?self.config.throttle_policy, "throttle in effect, skipping fail");
            return Ok(());
        }
        match self.repository.fail(&node.hostname, AGENT, reason).await {
            Ok(_) => tracing::warn!(hostname = %node.hostname, reason, "failed ready node"),
            Err(error) => tracing::warn!(hostname = %node.hostname, %error, reason, "fail() failed, retrying next tick"),
        }
        Ok(())
    }

    /// Phase C: append/clear `down` events from the service monitor's
    /// view. When the monitor's global status is not known, every
    /// status is treated as `Unknown` regardless of what is reported.
    async fn phase_c_update_down_history(&self) -> NodeFailureResult<()> {
        let status_known = self.monitor.status_is_known();
        let instances = match self.monitor.get_all_application_instances().await {
            Ok(instances) => instances,
            Err(error) => {
                tracing::warn!(%error, "service monitor unavailable this tick");
                return Ok(());
            }
        };

        for (application_id, instance) in instances {
            for cluster in instance.service_clusters {
                for service in cluster.service_instances {
                    let status = if status_known { service.status } else { ServiceStatus::Unknown };
                    match status {
                        ServiceStatus::Down => self.mark_down(&application_id, &service.host_name).await?,
                        ServiceStatus::Up => self.clear_down(&application_id, &service.host_name).await?,
                        ServiceStatus::Unknown => {}
                    }
                }
            }
        }
        Ok(())
    }

    async fn mark_down(&self, application_id: &str, hostname: &str) -> NodeFailureResult<()> {
        let _guard = self.repository.lock_application(application_id).await?;
        let Some(node) = self.repository.get_node(hostname).await? else {
            return Ok(());
        };
        if node.state != NodeState::Active || node.has_event(EventType::Down) {
            return Ok(());
        }
        let mut updated = node;
        updated.record(HistoryEvent::new(EventType::Down, "service-monitor", self.clock.now()));
        self.repository.write(updated).await
    }

    async fn clear_down(&self, application_id: &str, hostname: &str) -> NodeFailureResult<()> {
        let _guard = self.repository.lock_application(application_id).await?;
        let Some(node) = self.repository.get_node(hostname).await? else {
            return Ok(());
        };
        if node.state != NodeState::Active || !node.has_event(EventType::Down) {
            return Ok(());
        }
        let mut updated = node;
        updated.clear_event(EventType::Down);
        self.repository.write(updated).await
    }

    /// Phase D: fail active nodes whose `down` event is older than
    /// `downTimeLimit`, subject to suspension, per-type gating, and
    /// the throttle.
    async fn phase_d_fail_long_down(&self) -> NodeFailureResult<()> {
        // An outage that makes current status unknown also halts
        // destructive action on previously-recorded down events - the
        // down event's continued validity cannot be reconfirmed while
        // the monitor is blacked out (§7: "make no transition for
        // affected nodes" read as covering this phase too).
        if !self.monitor.status_is_known() {
            tracing::info!("service monitor status not known, skipping long-down fail checks this tick");
            return Ok(());
        }

        let now = self.clock.now();
        let mut active_nodes = self.repository.get_nodes(Some(NodeState::Active)).await?;
        // `get_nodes` has no ordering guarantee of its own (the in-memory
        // repository is HashMap-backed); sort oldest-down-first so which
        // node consumes a scarce throttle slot is at least deterministic,
        // not truly "insertion order of the monitor's reports" since that
        // order isn't preserved past the monitor's own HashMap-shaped API.
        active_nodes.sort_by_key(|n| (n.event_at(EventType::Down), n.hostname.clone()));

        for node in active_nodes {
            let Some(down_at) = node.event_at(EventType::Down) else {
                continue;
            };
            if now - down_at <= to_chrono(self.config.down_time_limit) {
                continue;
            }
            let Some(allocation) = node.allocation.clone() else {
                tracing::error!(hostname = %node.hostname, "active node has no allocation");
                continue;
            };

            match self.orchestrator.get_application_instance_status(&allocation.application_id).await {
                Ok(ApplicationInstanceStatus::AllowedToBeDown) => {
                    tracing::info!(hostname = %node.hostname, application_id = %allocation.application_id, "application allowed to be down, skipping");
                    continue;
                }
                Ok(ApplicationInstanceStatus::NoRemarks) => {}
                Err(OrchestratorError::ApplicationIdNotFound(_)) => {
                    // Unknown application cannot veto; treat as not suspended.
                }
                Err(error) => {
                    tracing::warn!(%error, application_id = %allocation.application_id, "orchestrator query failed, retrying next tick");
                    continue;
                }
            }

            if !self.fail_allowed_for(node.node_type).await? {
                continue;
            }

            let all_nodes = self.repository.get_nodes(None).await?;
            if throttle::is_throttled(&self.config.throttle_policy, &all_nodes, now) {
                tracing::info!(hostname = %node.hostname, "throttle in effect, skipping fail-active");
                continue;
            }

            let reason = "Service reported DOWN longer than downTimeLimit";
            match self.fail_active(node.hostname.clone(), allocation.application_id.clone(), reason.to_string()).await {
                Ok(true) => tracing::warn!(hostname = %node.hostname, "cascaded fail-active succeeded"),
                Ok(false) => tracing::info!(hostname = %node.hostname, "cascaded fail-active aborted, will retry next tick"),
                Err(error) => tracing::warn!(hostname = %node.hostname, %error, "cascaded fail-active errored"),
            }
        }
        Ok(())
    }

    async fn fail_allowed_for(&self, node_type: NodeType) -> NodeFailureResult<bool> {
        if node_type.fail_unconditional() {
            return Ok(true);
        }
        let already_failed = self.repository.get_nodes_of_type(node_type, NodeState::Failed).await?;
        Ok(already_failed.is_empty())
    }

    /// The cascaded fail-active protocol (§4.4). Recursion is boxed
    /// because `async fn` cannot be directly recursive.
    pub fn fail_active(&self, hostname: String, application_id: String, reason: String) -> BoxFuture<'_, ControlLoopResult<bool>> {
        Box::pin(async move {
            let Some(handle) = self.deployer.deploy_from_local_active(&application_id, Duration::from_secs(30 * 60)).await else {
                tracing::info!(application_id = %application_id, "deployer handle unavailable, another replica owns this deployment");
                return Ok(false);
            };

            let _app_guard = self.repository.lock_application(&application_id).await?;
            let target = self
                .repository
                .get_node(&hostname)
                .await?
                .ok_or_else(|| NodeFailureError::NodeNotFound(hostname.clone()))?;

            if target.node_type == NodeType::Host {
                let children = self.repository.get_child_nodes(&hostname).await?;
                for child in children {
                    if child.state == NodeState::Active {
                        let child_application_id = child
                            .allocation
                            .as_ref()
                            .ok_or_else(|| NodeFailureError::InvariantViolation(format!("active child {} has no allocation", child.hostname)))?
                            .application_id
                            .clone();
                        // `lock_application` is a non-reentrant tokio mutex; a child
                        // sharing the host's own application would deadlock here.
                        // The topology never allocates a host's children to the
                        // host's own application, but nothing enforces that upstream.
                        debug_assert_ne!(
                            child_application_id, application_id,
                            "child node allocated to its host's own application would deadlock re-locking it"
                        );
                        let child_ok = self.fail_active(child.hostname.clone(), child_application_id, reason.clone()).await?;
                        if !child_ok {
                            tracing::warn!(hostname = %child.hostname, "child fail-active aborted, aborting host cascade");
                            return Ok(false);
                        }
                    } else if let Err(error) = self.repository.fail(&child.hostname, AGENT, &reason).await {
                        tracing::warn!(hostname = %child.hostname, %error, "unconditional child fail failed");
                    }
                }
            }

            self.repository.fail(&hostname, AGENT, &reason).await?;

            match handle.activate().await {
                Ok(()) => Ok(true),
                Err(error) => {
                    tracing::warn!(hostname = %hostname, %error, "activation failed after fail, rolling back target");
                    if let Err(rollback_error) = self.repository.reactivate(&hostname, AGENT).await {
                        tracing::error!(hostname = %hostname, error = %rollback_error, "rollback reactivate also failed");
                    }
                    Ok(false)
                }
            }
        })
    }
}

#[async_trait]
impl Maintainer for NodeFailer {
    fn name(&self) -> &str {
        "node-failer"
    }

    fn interval(&self) -> Duration {
        self.config.interval
    }

    async fn step(&self) -> NodeFailureResult<()> {
        self.phase_a_liveness_bookkeeping().await?;
        self.phase_b_fail_dead_or_faulted().await?;
        self.phase_c_update_down_history().await?;
        self.phase_d_fail_long_down().await?;
        Ok(())
    }
}
