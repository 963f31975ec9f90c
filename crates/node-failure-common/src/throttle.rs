//! The throttle policy value object. The engine that *applies* a
//! policy against a node population lives in `node-failure-core`
//! (it needs the repository-shaped `Node` history, which this crate
//! already provides, but the decision procedure is control-loop
//! behavior, not a domain type).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Rolling-window fail-rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThrottlePolicy {
    pub throttle_window: Duration,
    pub fraction_allowed_to_fail: f64,
    pub minimum_allowed_to_fail: u32,
}

impl ThrottlePolicy {
    pub fn new(throttle_window: Duration, fraction_allowed_to_fail: f64, minimum_allowed_to_fail: u32) -> Self {
        Self {
            throttle_window,
            fraction_allowed_to_fail,
            minimum_allowed_to_fail,
        }
    }

    /// Equivalent to `{0, 0, 0}`; the engine short-circuits to "never
    /// throttle" for this policy without touching repository history.
    pub const fn disabled() -> Self {
        Self {
            throttle_window: Duration::ZERO,
            fraction_allowed_to_fail: 0.0,
            minimum_allowed_to_fail: 0,
        }
    }

    pub fn is_disabled(&self) -> bool {
        *self == Self::disabled()
    }

    /// Recommended production default: `{1 day, 1%, 2}`.
    pub const fn production_default() -> Self {
        Self {
            throttle_window: Duration::from_secs(24 * 60 * 60),
            fraction_allowed_to_fail: 0.01,
            minimum_allowed_to_fail: 2,
        }
    }
}
