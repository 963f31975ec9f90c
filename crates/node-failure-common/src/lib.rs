//! node-failure-common - shared domain types for the node-failure
//! control loop.
//!
//! This crate defines the node entity, its history log, the throttle
//! policy value object, and the error vocabulary the rest of the
//! control loop builds on. It has no opinion on how nodes are stored
//! or how collaborators are reached - see `node-failure-core` for that.

#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod error;
pub mod history;
pub mod node;
pub mod throttle;

pub use error::{NodeFailureError, NodeFailureResult};
pub use history::{EventType, HistoryEvent};
pub use node::{Allocation, Flavor, Node, NodeState, NodeStatus, NodeType};
pub use throttle::ThrottlePolicy;
