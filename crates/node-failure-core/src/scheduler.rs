//! Maintainer scheduling contract shared by the failer and the
//! expirer: run `step()` on a fixed cadence, skip a tick when the
//! job-control gate is closed (no catch-up), and never let a `step()`
//! failure abort the scheduler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use node_failure_common::NodeFailureError;

use crate::collaborators::JobControl;

#[async_trait]
pub trait Maintainer: Send + Sync {
    fn name(&self) -> &str;
    fn interval(&self) -> Duration;
    async fn step(&self) -> Result<(), NodeFailureError>;
}

/// Runs each registered maintainer on its own `tokio::time::interval`
/// loop, serially per maintainer, concurrently across maintainers.
pub struct MaintainerScheduler {
    job_control: Arc<dyn JobControl>,
}

impl MaintainerScheduler {
    pub fn new(job_control: Arc<dyn JobControl>) -> Self {
        Self { job_control }
    }

    /// Spawn one maintainer's tick loop. The returned handle runs
    /// until aborted or the process exits; a single `step()` failure
    /// is caught, logged, and the loop continues on the same cadence.
    pub fn spawn(&self, maintainer: Arc<dyn Maintainer>) -> tokio::task::JoinHandle<()> {
        let job_control = self.job_control.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(maintainer.interval());
            loop {
                ticker.tick().await;
                if !job_control.is_allowed(maintainer.name()) {
                    tracing::debug!(maintainer = maintainer.name(), "job-control closed, skipping tick");
                    continue;
                }
                if let Err(error) = maintainer.step().await {
                    tracing::warn!(maintainer = maintainer.name(), %error, "maintainer step failed, retrying next tick");
                }
            }
        })
    }
}
