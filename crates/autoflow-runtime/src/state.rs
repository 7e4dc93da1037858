// crates/autoflow-runtime/src/state.rs

use autoflow_core::{
    NodeId, OutcomeHistory, Port, ResultClass, RunId, RunStatus, FAIL_PORT, PASS_PORT,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Idle,
    Running,
    Paused,
    Cancelled,
    Completed,
    Errored,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Idle => "IDLE",
            RunPhase::Running => "RUNNING",
            RunPhase::Paused => "PAUSED",
            RunPhase::Cancelled => "CANCELLED",
            RunPhase::Completed => "COMPLETED",
            RunPhase::Errored => "ERRORED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunPhase::Cancelled | RunPhase::Completed | RunPhase::Errored
        )
    }

    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Running, Cancelled)
                | (Running, Errored)
                | (Paused, Cancelled)
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the runner knows about one run. Owned by the runner alone.
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: RunId,
    phase: RunPhase,
    pub current: Option<NodeId>,
    histories: HashMap<NodeId, OutcomeHistory>,
    pub path: Vec<NodeId>,
    pub step_mode: bool,
    /// Set by STEP_CONTINUE: pause again after the next node, even if step
    /// mode is switched off meanwhile. Cleared when the run pauses.
    pub single_step: bool,
    /// Pause before the next node starts.
    pub pause_pending: bool,
    pub error: Option<String>,
    pub graceful_stop: bool,
    pub termination: Option<Termination>,
}

impl RunState {
    pub fn new(run_id: RunId, start: NodeId, step_mode: bool) -> Self {
        Self {
            run_id,
            phase: RunPhase::Idle,
            current: Some(start),
            histories: HashMap::new(),
            path: Vec::new(),
            step_mode,
            single_step: false,
            pause_pending: false,
            error: None,
            graceful_stop: false,
            termination: None,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Move to `next` if the state machine allows it.
    pub fn transition(&mut self, next: RunPhase) -> bool {
        if self.phase == next {
            return true;
        }
        if !self.phase.can_transition_to(next) {
            tracing::warn!("Ignoring illegal run transition {} -> {}", self.phase, next);
            return false;
        }
        tracing::debug!("Run {}: {} -> {}", self.run_id, self.phase, next);
        self.phase = next;
        true
    }

    pub fn history(&self, node: &str) -> Option<&OutcomeHistory> {
        self.histories.get(node)
    }

    pub fn history_mut(&mut self, node: &str) -> &mut OutcomeHistory {
        self.histories.entry(node.to_string()).or_default()
    }

    /// Number of node executions so far, including ones that errored.
    pub fn executions(&self) -> usize {
        self.path.len()
    }

    /// Times `node` has been executed in this run.
    pub fn visits(&self, node: &str) -> usize {
        self.histories.get(node).map_or(0, OutcomeHistory::len)
    }

    pub fn histories(&self) -> &HashMap<NodeId, OutcomeHistory> {
        &self.histories
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationKind {
    /// The FAIL port was chosen and nothing is wired to it.
    ReproFound,
    /// The PASS port was chosen and nothing is wired to it.
    NoRepro,
    UnwiredPort,
}

/// How a completed run ended: the node whose chosen port had no successor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Termination {
    pub node: NodeId,
    pub port: Port,
    pub kind: TerminationKind,
    pub reason: String,
}

impl Termination {
    pub fn unwired(node: NodeId, port: Port) -> Self {
        let (kind, reason) = match port {
            FAIL_PORT => (
                TerminationKind::ReproFound,
                format!("failure reproduced on '{}' and port {} is not wired", node, port),
            ),
            PASS_PORT => (
                TerminationKind::NoRepro,
                format!("no failure on '{}' and port {} is not wired", node, port),
            ),
            _ => (
                TerminationKind::UnwiredPort,
                format!("port {} on '{}' is not wired", port, node),
            ),
        };
        Self {
            node,
            port,
            kind,
            reason,
        }
    }
}

/// Final snapshot handed back when a run ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: RunId,
    pub phase: RunPhase,
    /// Node ids in execution order; revisits appear once per visit.
    pub path: Vec<NodeId>,
    pub histories: BTreeMap<NodeId, OutcomeHistory>,
    pub classifications: BTreeMap<NodeId, ResultClass>,
    /// Node that would have run next. `None` once the run completed.
    pub current: Option<NodeId>,
    /// Set only for completed runs.
    pub termination: Option<Termination>,
    pub graceful_stop: bool,
    pub error: Option<String>,
    pub last_seq: u64,
    pub events_delivered: u64,
    pub events_dropped: u64,
}

impl RunReport {
    pub fn history(&self, node: &str) -> &[RunStatus] {
        self.histories
            .get(node)
            .map(OutcomeHistory::as_slice)
            .unwrap_or(&[])
    }

    pub fn executions(&self) -> usize {
        self.path.len()
    }
}
