//! Stateless throttle engine: given a policy, the current node
//! population, and the current instant, decide whether another fail
//! is allowed in the rolling window. Throttling is re-derived from
//! repository history at each decision point, so it survives process
//! restarts and is read-your-writes only with respect to this
//! process's own committed transitions.

use chrono::{DateTime, Utc};
use node_failure_common::{EventType, Node, ThrottlePolicy};

fn to_chrono(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

/// `true` iff another node may not be failed under `policy` right now.
pub fn is_throttled(policy: &ThrottlePolicy, nodes: &[Node], now: DateTime<Utc>) -> bool {
    if policy.is_disabled() {
        return false;
    }

    let population: Vec<&Node> = nodes.iter().filter(|n| !n.is_container()).collect();
    let window_start = now - to_chrono(policy.throttle_window);
    let recently_failed = population
        .iter()
        .filter(|n| n.event_at(EventType::Failed).map(|at| at > window_start).unwrap_or(false))
        .count() as u32;

    let fraction_budget = (population.len() as f64 * policy.fraction_allowed_to_fail).floor() as u32;
    let budget = fraction_budget.max(policy.minimum_allowed_to_fail);

    recently_failed >= budget
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use node_failure_common::{Flavor, HistoryEvent, NodeType};
    use std::time::Duration;

    fn failed_node(hostname: &str, flavor: Flavor, failed_at: DateTime<Utc>) -> Node {
        let mut node = Node::new(hostname, NodeType::Tenant, flavor);
        node.record(HistoryEvent::new(EventType::Failed, "test", failed_at));
        node
    }

    #[test]
    fn disabled_policy_never_throttles() {
        let now = Utc::now();
        let nodes: Vec<Node> = (0..100).map(|i| failed_node(&format!("n{i}"), Flavor::Other, now)).collect();
        assert!(!is_throttled(&ThrottlePolicy::disabled(), &nodes, now));
    }

    #[test]
    fn container_failures_do_not_consume_budget() {
        let now = Utc::now();
        let policy = ThrottlePolicy::new(Duration::from_secs(3600), 0.0, 1);
        let nodes = vec![failed_node("c1", Flavor::DockerContainer, now)];
        assert!(!is_throttled(&policy, &nodes, now));
    }

    #[test]
    fn minimum_floor_applies_to_small_populations() {
        let now = Utc::now();
        let policy = ThrottlePolicy::new(Duration::from_secs(3600), 0.01, 2);
        let mut nodes: Vec<Node> = (0..50).map(|i| {
            let mut n = Node::new(format!("ready{i}"), NodeType::Tenant, Flavor::Other);
            n.state = node_failure_common::NodeState::Ready;
            n
        }).collect();
        nodes[0] = failed_node("ready0", Flavor::Other, now);
        assert!(!is_throttled(&policy, &nodes, now));
        nodes[1] = failed_node("ready1", Flavor::Other, now);
        assert!(is_throttled(&policy, &nodes, now));
    }

    #[test]
    fn percentage_budget_applies_to_large_populations() {
        let now = Utc::now();
        let policy = ThrottlePolicy::new(Duration::from_secs(3600), 0.01, 2);
        let mut nodes: Vec<Node> = (0..500).map(|i| {
            let mut n = Node::new(format!("ready{i}"), NodeType::Tenant, Flavor::Other);
            n.state = node_failure_common::NodeState::Ready;
            n
        }).collect();
        for i in 0..4 {
            nodes[i] = failed_node(&format!("ready{i}"), Flavor::Other, now);
        }
        assert!(!is_throttled(&policy, &nodes, now), "4 failed of 500 should fit under the 1% (5) floor");
        nodes[4] = failed_node("ready4", Flavor::Other, now);
        assert!(is_throttled(&policy, &nodes, now), "5 failed of 500 should hit the 1% budget");
    }

    #[test]
    fn window_expiry_frees_budget() {
        let policy = ThrottlePolicy::new(Duration::from_secs(3600), 0.0, 1);
        let now = Utc::now();
        let stale = failed_node("n0", Flavor::Other, now - ChronoDuration::seconds(3601));
        assert!(!is_throttled(&policy, &[stale], now));
    }
}
