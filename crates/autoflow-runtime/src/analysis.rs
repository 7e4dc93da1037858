// crates/autoflow-runtime/src/analysis.rs

use autoflow_core::{FlowGraph, NodeId, Port};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::{HashMap, HashSet};

/// Structural facts about a flow graph. Nothing here makes a graph invalid;
/// the runner only logs warnings from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphAnalysis {
    /// Nodes reachable from the start node, in id order.
    pub reachable: Vec<NodeId>,
    /// Nodes no route from the start node can ever visit.
    pub unreachable: Vec<NodeId>,
    /// Nodes with at least one unwired routing port.
    pub exits: Vec<NodeId>,
    /// Whether some reachable node can end the run.
    pub terminal_reachable: bool,
    /// Retry loops show up here; they are legal.
    pub has_cycles: bool,
}

pub fn analyze(graph: &FlowGraph) -> GraphAnalysis {
    let mut digraph = DiGraph::<&str, Port>::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();

    for node in graph.nodes() {
        index.insert(node.id().as_str(), digraph.add_node(node.id().as_str()));
    }
    for node in graph.nodes() {
        for (port, successor) in node.outputs() {
            if let (Some(&from), Some(&to)) =
                (index.get(node.id().as_str()), index.get(successor.as_str()))
            {
                digraph.add_edge(from, to, *port);
            }
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    if let Some(&start) = index.get(graph.start().as_str()) {
        let mut dfs = Dfs::new(&digraph, start);
        while let Some(ix) = dfs.next(&digraph) {
            seen.insert(digraph[ix]);
        }
    }

    let mut analysis = GraphAnalysis {
        has_cycles: is_cyclic_directed(&digraph),
        ..Default::default()
    };

    for node in graph.nodes() {
        let is_exit = node
            .policy()
            .ports()
            .iter()
            .any(|port| node.successor_for(*port).is_none());
        if is_exit {
            analysis.exits.push(node.id().clone());
        }

        if seen.contains(node.id().as_str()) {
            analysis.reachable.push(node.id().clone());
            if is_exit {
                analysis.terminal_reachable = true;
            }
        } else {
            analysis.unreachable.push(node.id().clone());
        }
    }

    analysis
}
