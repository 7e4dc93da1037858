use crate::{OutcomeHistory, Port};
use serde::{Deserialize, Serialize};

/// Port taken when the history reads as failing.
pub const FAIL_PORT: Port = 0;

/// Port taken otherwise, including for an empty history.
pub const PASS_PORT: Port = 1;

/// Decides which output port a node takes, given its outcome history.
///
/// Every variant is total: an empty history (first visit) routes to
/// [`PASS_PORT`]. ERROR entries count as failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoutingPolicy {
    /// Only the most recent entry matters.
    #[default]
    SingleFail,

    /// Fails only when every entry so far failed.
    AllFail,

    /// Fails when at least half the entries (rounded up) failed.
    MajorityFail,

    /// Fails when more than `threshold` of the last `window` entries failed.
    Adaptive { threshold: usize, window: usize },
}

impl RoutingPolicy {
    pub fn next_port(&self, history: &OutcomeHistory) -> Port {
        if history.is_empty() {
            return PASS_PORT;
        }

        let failing = match *self {
            RoutingPolicy::SingleFail => history.last().is_some_and(|s| s.counts_as_fail()),
            RoutingPolicy::AllFail => history.iter().all(|s| s.counts_as_fail()),
            RoutingPolicy::MajorityFail => history.fail_count() >= history.len().div_ceil(2),
            RoutingPolicy::Adaptive { threshold, window } => {
                let recent_fails = history
                    .window(window)
                    .iter()
                    .filter(|s| s.counts_as_fail())
                    .count();
                recent_fails > threshold
            }
        };

        if failing {
            FAIL_PORT
        } else {
            PASS_PORT
        }
    }

    /// Every port this policy can return.
    pub fn ports(&self) -> &'static [Port] {
        &[FAIL_PORT, PASS_PORT]
    }

    pub fn name(&self) -> &'static str {
        match self {
            RoutingPolicy::SingleFail => "single_fail",
            RoutingPolicy::AllFail => "all_fail",
            RoutingPolicy::MajorityFail => "majority_fail",
            RoutingPolicy::Adaptive { .. } => "adaptive",
        }
    }
}
