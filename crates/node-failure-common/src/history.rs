//! Node history: an append-or-replace-by-type event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event kinds recorded on a node's history. Each appears at most once;
/// writing an event of a given type replaces any prior one of that type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventType {
    Provisioned,
    Readied,
    Reserved,
    Activated,
    Requested,
    Down,
    Failed,
    Deactivated,
    Parked,
    Dirtied,
}

/// One history entry: who did it, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub event_type: EventType,
    pub agent: String,
    pub at: DateTime<Utc>,
}

impl HistoryEvent {
    pub fn new(event_type: EventType, agent: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            event_type,
            agent: agent.into(),
            at,
        }
    }
}
