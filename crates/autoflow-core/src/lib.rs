//! Core abstractions for the automation flow engine
//!
//! This crate holds the graph model, outcome history, routing policies, the
//! executor contract and the control-channel message types. It has no
//! runtime dependencies.

mod error;
pub mod events;
mod experiment;
mod graph;
mod history;
mod node;
mod policy;
mod status;
mod value;

pub use error::{ChannelError, ExecutionError, FlowError, GraphIssue, ValidationError};
pub use events::*;
pub use experiment::{BootConfig, ExperimentDefinition, ExperimentExecutor};
pub use graph::FlowGraph;
pub use history::{OutcomeHistory, ResultClass};
pub use node::{FlowNode, NodeId, Port};
pub use policy::{RoutingPolicy, FAIL_PORT, PASS_PORT};
pub use status::{RunStatus, UnknownStatus};
pub use value::Value;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
