use crate::{FlowNode, GraphIssue, NodeId, RoutingPolicy, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Nodes keyed by id plus the node a run starts from.
///
/// Immutable while a run is in progress; the same graph may be reused for
/// any number of sequential runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GraphDocument", into = "GraphDocument")]
pub struct FlowGraph {
    name: String,
    description: Option<String>,
    start: NodeId,
    nodes: BTreeMap<NodeId, FlowNode>,
}

/// On-disk shape: nodes as a list.
#[derive(Serialize, Deserialize)]
struct GraphDocument {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    start: NodeId,
    nodes: Vec<FlowNode>,
}

impl TryFrom<GraphDocument> for FlowGraph {
    type Error = ValidationError;

    fn try_from(doc: GraphDocument) -> Result<Self, Self::Error> {
        let mut graph = FlowGraph::from_nodes(doc.name, doc.start, doc.nodes)?;
        graph.description = doc.description;
        Ok(graph)
    }
}

impl From<FlowGraph> for GraphDocument {
    fn from(graph: FlowGraph) -> Self {
        Self {
            name: graph.name,
            description: graph.description,
            start: graph.start,
            nodes: graph.nodes.into_values().collect(),
        }
    }
}

impl FlowGraph {
    pub fn new(name: impl Into<String>, start: impl Into<NodeId>) -> Self {
        Self {
            name: name.into(),
            description: None,
            start: start.into(),
            nodes: BTreeMap::new(),
        }
    }

    /// Build a graph from a node list. Duplicate ids are rejected here; the
    /// remaining structural checks belong to [`FlowGraph::validate`].
    pub fn from_nodes(
        name: impl Into<String>,
        start: impl Into<NodeId>,
        nodes: impl IntoIterator<Item = FlowNode>,
    ) -> Result<Self, ValidationError> {
        let mut graph = Self::new(name, start);
        let mut duplicates = Vec::new();
        for node in nodes {
            if let Err(issue) = graph.insert(node) {
                duplicates.push(issue);
            }
        }
        if duplicates.is_empty() {
            Ok(graph)
        } else {
            Err(ValidationError { issues: duplicates })
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn add_node(&mut self, node: FlowNode) -> Result<(), ValidationError> {
        self.insert(node).map_err(ValidationError::single)
    }

    fn insert(&mut self, node: FlowNode) -> Result<(), GraphIssue> {
        if self.nodes.contains_key(node.id()) {
            return Err(GraphIssue::DuplicateNode(node.id().clone()));
        }
        self.nodes.insert(node.id().clone(), node);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn start(&self) -> &NodeId {
        &self.start
    }

    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &FlowNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check the structure before any experiment runs.
    ///
    /// Cycles are legal and are not reported here.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if !self.nodes.contains_key(&self.start) {
            issues.push(GraphIssue::MissingStartNode(self.start.clone()));
        }

        for node in self.nodes.values() {
            for (port, successor) in node.outputs() {
                if !self.nodes.contains_key(successor) {
                    issues.push(GraphIssue::DanglingSuccessor {
                        from: node.id().clone(),
                        port: *port,
                        to: successor.clone(),
                    });
                }
            }
            if let RoutingPolicy::Adaptive { window: 0, .. } = node.policy() {
                issues.push(GraphIssue::EmptyAdaptiveWindow(node.id().clone()));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}
