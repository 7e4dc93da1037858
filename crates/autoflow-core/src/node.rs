use crate::{
    BootConfig, ExecutionError, ExperimentDefinition, ExperimentExecutor, OutcomeHistory,
    RoutingPolicy, RunStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type NodeId = String;

/// Output selector of a node.
pub type Port = u32;

/// A graph vertex: one experiment, the policy that routes on its results, and
/// the successor wired to each port.
///
/// Successors are ids, not references, so retry loops back to the same node
/// are plain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    experiment: ExperimentDefinition,
    #[serde(default)]
    policy: RoutingPolicy,
    #[serde(default)]
    outputs: BTreeMap<Port, NodeId>,
}

impl FlowNode {
    pub fn new(id: impl Into<NodeId>, experiment: ExperimentDefinition) -> Self {
        Self {
            id: id.into(),
            name: None,
            experiment,
            policy: RoutingPolicy::default(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_policy(mut self, policy: RoutingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_output(mut self, port: Port, successor: impl Into<NodeId>) -> Self {
        self.outputs.insert(port, successor.into());
        self
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Display name, falling back to the id.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn experiment(&self) -> &ExperimentDefinition {
        &self.experiment
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    pub fn outputs(&self) -> &BTreeMap<Port, NodeId> {
        &self.outputs
    }

    pub fn is_terminal(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Successor wired to `port`. `None` ends the run on this branch.
    pub fn successor_for(&self, port: Port) -> Option<&NodeId> {
        self.outputs.get(&port)
    }

    /// Run the experiment once and append the outcome to `history`.
    ///
    /// On an execution error `ERROR` is recorded before the error is returned,
    /// so the history stays complete for diagnosis.
    pub async fn execute(
        &self,
        executor: &dyn ExperimentExecutor,
        boot: &BootConfig,
        history: &mut OutcomeHistory,
    ) -> Result<RunStatus, ExecutionError> {
        match executor.execute(&self.experiment, boot).await {
            Ok(status) => {
                history.push(status);
                Ok(status)
            }
            Err(e) => {
                history.push(RunStatus::Error);
                Err(e)
            }
        }
    }
}
