use crate::{NodeId, Port};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Runner task failed: {0}")]
    Runner(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A malformed flow graph. Every problem found is listed, not just the first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid flow graph: {}", describe(.issues))]
pub struct ValidationError {
    pub issues: Vec<GraphIssue>,
}

impl ValidationError {
    pub fn single(issue: GraphIssue) -> Self {
        Self {
            issues: vec![issue],
        }
    }
}

fn describe(issues: &[GraphIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphIssue {
    #[error("start node '{0}' does not exist")]
    MissingStartNode(NodeId),

    #[error("node '{from}' port {port} points to unknown node '{to}'")]
    DanglingSuccessor { from: NodeId, port: Port, to: NodeId },

    #[error("duplicate node id '{0}'")]
    DuplicateNode(NodeId),

    #[error("node '{0}' has an adaptive policy with an empty window")]
    EmptyAdaptiveWindow(NodeId),
}

/// The executor could not produce a verdict at all. Distinct from a FAIL result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Hardware unreachable: {0}")]
    Unreachable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("No executor registered for kind '{0}'")]
    UnknownKind(String),

    #[error("Execution failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel is full")]
    Full,

    #[error("channel is closed")]
    Closed,

    #[error("timed out waiting for channel capacity")]
    Timeout,
}
