//! node-failure-core - the node-failure control loop: the failer's
//! periodic decision procedure, the cascaded fail-active protocol, the
//! throttle engine, the failed-node expirer, and the maintainer
//! scheduling contract they share.
//!
//! This crate does not implement the node repository, the liveness
//! tracker, the service monitor, the orchestrator, or the deployer -
//! those are external collaborators (see `collaborators` and
//! `repository`). `testing` ships in-memory reference implementations
//! of all of them for local development and for this crate's own
//! tests.

#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod collaborators;
pub mod error;
pub mod expirer;
pub mod failer;
pub mod repository;
pub mod scheduler;
pub mod testing;
pub mod throttle;

pub use collaborators::{
    ApplicationInstance, ApplicationInstanceStatus, Clock, Deployer, DeployerError, DeploymentHandle,
    JobControl, LivenessTracker, MonitorError, Orchestrator, OrchestratorError, ServiceCluster,
    ServiceInstance, ServiceMonitor, ServiceStatus,
};
pub use error::{ControlLoopError, ControlLoopResult};
pub use expirer::{Environment, ExpirerConfig, FailedNodeExpirer};
pub use failer::{NodeFailer, NodeFailerConfig};
pub use repository::{LockGuard, NodeRepository};
pub use scheduler::{Maintainer, MaintainerScheduler};
