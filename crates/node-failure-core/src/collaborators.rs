//! Capability-set traits for the five external collaborators named in
//! the spec: node repository (see `repository.rs`), host-liveness
//! tracker, service monitor, orchestrator, deployer, clock, and
//! job-control. Each is a narrow `async_trait` so a caller can swap in
//! a test double without touching the decision logic.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Monotonic instant source. Implementations must never go backwards.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Per-job run permission, queried by maintainer name before each tick.
pub trait JobControl: Send + Sync {
    fn is_allowed(&self, job_name: &str) -> bool;
}

/// "Last request observed from host H", for unassigned (ready) nodes.
#[async_trait]
pub trait LivenessTracker: Send + Sync {
    async fn last_request_from(&self, hostname: &str) -> Option<DateTime<Utc>>;
}

/// Per-service-instance liveness, grouped by application and cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Up,
    Down,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub host_name: String,
    pub status: ServiceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCluster {
    pub service_instances: Vec<ServiceInstance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationInstance {
    pub service_clusters: Vec<ServiceCluster>,
}

/// The service monitor may be temporarily unavailable; when
/// `status_is_known` is false every status encountered this tick must
/// be treated as `Unknown` regardless of what is reported.
#[async_trait]
pub trait ServiceMonitor: Send + Sync {
    async fn get_all_application_instances(&self) -> Result<HashMap<String, ApplicationInstance>, MonitorError>;
    fn status_is_known(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("service monitor unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationInstanceStatus {
    NoRemarks,
    AllowedToBeDown,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("application not known to orchestrator: {0}")]
    ApplicationIdNotFound(String),
    #[error("orchestrator unavailable: {0}")]
    Unavailable(String),
}

/// Suspension oracle. Unknown applications are the caller's
/// responsibility to treat as "not suspended" (§7).
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn get_application_instance_status(
        &self,
        application_id: &str,
    ) -> Result<ApplicationInstanceStatus, OrchestratorError>;
}

#[derive(Debug, Error)]
pub enum DeployerError {
    #[error("activation failed for application {0}: {1}")]
    ActivationFailed(String, String),
}

/// An opaque handle returned by `deploy_from_local_active`. Dropping it
/// without calling `activate` is a caller bug this crate never does.
#[async_trait]
pub trait DeploymentHandle: Send + Sync {
    async fn activate(&self) -> Result<(), DeployerError>;
}

/// Redeployment collaborator. An empty result from
/// `deploy_from_local_active` means another replica already owns this
/// deployment; the caller must abort, not retry inline.
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy_from_local_active(
        &self,
        application_id: &str,
        timeout: Duration,
    ) -> Option<Box<dyn DeploymentHandle>>;
}
