//! Node domain types - the entity the control loop reasons about.
//!
//! A `Node` mirrors the node-repository's record: identity, placement,
//! state, status, and a by-type history. This crate never talks to the
//! repository itself (see `node-failure-core::repository`); it only
//! defines the shape the repository hands back.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::{EventType, HistoryEvent};

/// Node type. Determines whether `failAllowedFor` is unconditional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Leaf workload node, owned by a single tenant application.
    Tenant,
    /// Physical host; may parent container children.
    Host,
    /// Shared ingress/egress proxy.
    Proxy,
    /// Cluster configuration server.
    Config,
}

impl NodeType {
    /// `{tenant, host}` may have unboundedly many nodes of the type
    /// in `failed` simultaneously; all other types are limited to one.
    pub fn fail_unconditional(self) -> bool {
        matches!(self, NodeType::Tenant | NodeType::Host)
    }
}

/// Flavor sub-kind. Only the container distinction matters to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flavor {
    /// Containerized leaf, always has a `parentHostname`.
    DockerContainer,
    /// Any other flavor (bare metal, VM, ...).
    Other,
}

/// Node lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    Provisioned,
    Ready,
    Reserved,
    Active,
    Inactive,
    Dirty,
    Failed,
    Parked,
}

/// Binding to an owning application, present iff the node is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub application_id: String,
    pub membership_index: u32,
}

/// Repository-maintained health bookkeeping that survives state
/// transitions until the node is recycled through `dirty`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Monotonically non-decreasing; incremented by the repository on
    /// every `fail()` call, never reset by `setDirty`/`park`/`reactivate`.
    pub fail_count: u32,
    pub hardware_failure_description: Option<String>,
    pub hardware_divergence: Option<String>,
}

/// A node record as observed by the control loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub hostname: String,
    pub node_type: NodeType,
    pub flavor: Flavor,
    pub state: NodeState,
    pub allocation: Option<Allocation>,
    pub status: NodeStatus,
    /// At most one event per `EventType`, keyed by type for
    /// append-or-replace-by-type semantics.
    history: BTreeMap<EventType, HistoryEvent>,
    pub parent_hostname: Option<String>,
}

impl Node {
    pub fn new(hostname: impl Into<String>, node_type: NodeType, flavor: Flavor) -> Self {
        Self {
            hostname: hostname.into(),
            node_type,
            flavor,
            state: NodeState::Provisioned,
            allocation: None,
            status: NodeStatus::default(),
            history: BTreeMap::new(),
            parent_hostname: None,
        }
    }

    /// Write (or overwrite) the history event for `event.event_type`.
    pub fn record(&mut self, event: HistoryEvent) {
        self.history.insert(event.event_type, event);
    }

    /// Remove the event of the given type, if present.
    pub fn clear_event(&mut self, event_type: EventType) {
        self.history.remove(&event_type);
    }

    pub fn event(&self, event_type: EventType) -> Option<&HistoryEvent> {
        self.history.get(&event_type)
    }

    pub fn has_event(&self, event_type: EventType) -> bool {
        self.history.contains_key(&event_type)
    }

    pub fn event_at(&self, event_type: EventType) -> Option<DateTime<Utc>> {
        self.event(event_type).map(|e| e.at)
    }

    pub fn is_container(&self) -> bool {
        matches!(self.flavor, Flavor::DockerContainer)
    }
}
