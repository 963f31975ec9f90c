//! The failed-node expirer (§4.5): a separate periodic task that
//! recycles nodes that have sat in `failed` past a grace interval.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use node_failure_common::{EventType, NodeFailureResult, NodeState, NodeType};
use serde::{Deserialize, Serialize};

use crate::collaborators::Clock;
use crate::repository::NodeRepository;
use crate::scheduler::Maintainer;

const AGENT: &str = "failed-node-expirer";

/// Deployment environment, gating the fail-count hardware-fault
/// heuristic (§4.5, §9): count >= 5 indicates hardware fault only in
/// production/staging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Production,
    Staging,
    Development,
}

impl Environment {
    fn fail_count_indicates_hardware_fault(self) -> bool {
        matches!(self, Environment::Production | Environment::Staging)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExpirerConfig {
    pub interval: Duration,
    pub fail_timeout: Duration,
    pub environment: Environment,
}

impl Default for ExpirerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30 * 60),
            fail_timeout: Duration::from_secs(4 * 60 * 60),
            environment: Environment::Production,
        }
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

pub struct FailedNodeExpirer {
    repository: Arc<dyn NodeRepository>,
    clock: Arc<dyn Clock>,
    config: ExpirerConfig,
}

impl FailedNodeExpirer {
    pub fn new(repository: Arc<dyn NodeRepository>, clock: Arc<dyn Clock>, config: ExpirerConfig) -> Self {
        Self { repository, clock, config }
    }

    /// A count >= 5 indicates hardware fault only in production/staging
    /// and only for non-container flavors (§4.5).
    fn fail_count_indicates_hardware_fault(&self, fail_count: u32, is_container: bool) -> bool {
        fail_count >= 5 && self.config.environment.fail_count_indicates_hardware_fault() && !is_container
    }
}

#[async_trait]
impl Maintainer for FailedNodeExpirer {
    fn name(&self) -> &str {
        "failed-node-expirer"
    }

    fn interval(&self) -> Duration {
        self.config.interval
    }

    async fn step(&self) -> NodeFailureResult<()> {
        let now = self.clock.now();
        let failed_nodes = self.repository.get_nodes(Some(NodeState::Failed)).await?;
        let mut recycle_batch = Vec::new();

        for node in failed_nodes {
            let Some(failed_at) = node.event_at(EventType::Failed) else {
                continue;
            };
            if now - failed_at <= to_chrono(self.config.fail_timeout) {
                continue;
            }

            let has_hardware_signal = node.status.hardware_failure_description.is_some() || node.status.hardware_divergence.is_some();
            if has_hardware_signal {
                if node.node_type == NodeType::Host {
                    let children = self.repository.get_child_nodes(&node.hostname).await?;
                    let all_parked = children.iter().all(|child| child.state == NodeState::Parked);
                    if all_parked {
                        if let Err(error) = self.repository.park(&node.hostname, AGENT, "HW failure/divergence").await {
                            tracing::warn!(hostname = %node.hostname, %error, "park failed, retrying next tick");
                        }
                    } else {
                        tracing::info!(hostname = %node.hostname, "host has hardware failure but children not all parked, leaving failed");
                    }
                } else if let Err(error) = self.repository.park(&node.hostname, AGENT, "HW failure/divergence").await {
                    tracing::warn!(hostname = %node.hostname, %error, "park failed, retrying next tick");
                }
                continue;
            }

            let indicates_hardware_fault = self.fail_count_indicates_hardware_fault(node.status.fail_count, node.is_container());
            if !indicates_hardware_fault || node.status.fail_count < 5 {
                recycle_batch.push(node.hostname.clone());
            }
        }

        if !recycle_batch.is_empty() {
            tracing::info!(count = recycle_batch.len(), "recycling expired failed nodes to dirty");
            self.repository.set_dirty(&recycle_batch).await?;
        }
        Ok(())
    }
}
