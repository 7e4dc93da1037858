// crates/autoflow-core/tests/graph_test.rs

use async_trait::async_trait;
use autoflow_core::{
    BootConfig, ExecutionError, ExperimentDefinition, ExperimentExecutor, FlowGraph, FlowNode,
    GraphIssue, OutcomeHistory, RoutingPolicy, RunStatus,
};

fn node(id: &str) -> FlowNode {
    FlowNode::new(id, ExperimentDefinition::new(format!("{} experiment", id)))
}

#[test]
fn test_missing_start_node_fails_validation() {
    let graph = FlowGraph::from_nodes("no start", "missing", vec![node("a")]).unwrap();

    let err = graph.validate().unwrap_err();
    assert_eq!(
        err.issues,
        vec![GraphIssue::MissingStartNode("missing".to_string())]
    );
}

#[test]
fn test_empty_graph_fails_validation() {
    let graph = FlowGraph::new("empty", "start");
    assert!(graph.validate().is_err());
}

#[test]
fn test_resolved_graph_passes_validation() {
    let graph = FlowGraph::from_nodes(
        "retry",
        "a",
        vec![
            node("a").with_output(0, "a").with_output(1, "b"),
            node("b").with_output(1, "c"),
            node("c"),
        ],
    )
    .unwrap();

    assert!(graph.validate().is_ok());
}

#[test]
fn test_every_dangling_successor_is_reported() {
    let graph = FlowGraph::from_nodes(
        "broken",
        "a",
        vec![
            node("a").with_output(0, "ghost").with_output(1, "b"),
            node("b").with_output(0, "phantom"),
        ],
    )
    .unwrap();

    let err = graph.validate().unwrap_err();
    assert_eq!(err.issues.len(), 2);
    assert!(err.issues.contains(&GraphIssue::DanglingSuccessor {
        from: "a".to_string(),
        port: 0,
        to: "ghost".to_string(),
    }));
    assert!(err.to_string().contains("phantom"));
}

#[test]
fn test_adaptive_window_must_not_be_empty() {
    let graph = FlowGraph::from_nodes(
        "adaptive",
        "a",
        vec![node("a").with_policy(RoutingPolicy::Adaptive {
            threshold: 1,
            window: 0,
        })],
    )
    .unwrap();

    let err = graph.validate().unwrap_err();
    assert_eq!(
        err.issues,
        vec![GraphIssue::EmptyAdaptiveWindow("a".to_string())]
    );
}

#[test]
fn test_duplicate_node_ids_are_rejected() {
    let err = FlowGraph::from_nodes("dup", "a", vec![node("a"), node("a")]).unwrap_err();
    assert_eq!(err.issues, vec![GraphIssue::DuplicateNode("a".to_string())]);

    let mut graph = FlowGraph::new("dup", "a");
    graph.add_node(node("a")).unwrap();
    assert!(graph.add_node(node("a")).is_err());
}

#[test]
fn test_terminal_nodes_have_no_successor() {
    let terminal = node("end");
    assert!(terminal.is_terminal());
    assert_eq!(terminal.successor_for(0), None);
    assert_eq!(terminal.successor_for(1), None);

    let branching = node("a").with_output(1, "b");
    assert!(!branching.is_terminal());
    assert_eq!(branching.successor_for(1), Some(&"b".to_string()));
    assert_eq!(branching.successor_for(0), None);
}

#[test]
fn test_graph_loads_from_json() {
    let json = r#"{
        "name": "vmin search",
        "start": "baseline",
        "nodes": [
            {
                "id": "baseline",
                "name": "Baseline",
                "experiment": {
                    "name": "Baseline Loops",
                    "kind": "simulated",
                    "parameters": { "loops": 5, "outcomes": ["PASS", "FAIL"] }
                },
                "policy": { "type": "all_fail" },
                "outputs": { "0": "sweep", "1": "baseline" }
            },
            {
                "id": "sweep",
                "experiment": { "name": "Voltage Sweep" }
            }
        ]
    }"#;

    let graph: FlowGraph = serde_json::from_str(json).unwrap();
    assert!(graph.validate().is_ok());
    assert_eq!(graph.len(), 2);

    let baseline = graph.node("baseline").unwrap();
    assert_eq!(baseline.name(), "Baseline");
    assert_eq!(baseline.policy(), &RoutingPolicy::AllFail);
    assert_eq!(baseline.successor_for(0), Some(&"sweep".to_string()));
    assert_eq!(baseline.experiment().kind(), Some("simulated"));
    assert_eq!(
        baseline
            .experiment()
            .parameter("loops")
            .and_then(|v| v.as_u64()),
        Some(5)
    );

    let sweep = graph.node("sweep").unwrap();
    assert_eq!(sweep.name(), "sweep");
    assert_eq!(sweep.policy(), &RoutingPolicy::SingleFail);
    assert!(sweep.is_terminal());

    let written = serde_json::to_string(&graph).unwrap();
    let reread: FlowGraph = serde_json::from_str(&written).unwrap();
    assert_eq!(reread, graph);
}

#[test]
fn test_graph_json_with_duplicate_ids_is_rejected() {
    let json = r#"{
        "name": "dup",
        "start": "a",
        "nodes": [
            { "id": "a", "experiment": { "name": "one" } },
            { "id": "a", "experiment": { "name": "two" } }
        ]
    }"#;

    let err = serde_json::from_str::<FlowGraph>(json).unwrap_err();
    assert!(err.to_string().contains("duplicate node id"));
}

struct Unreachable;

#[async_trait]
impl ExperimentExecutor for Unreachable {
    async fn execute(
        &self,
        _experiment: &ExperimentDefinition,
        _boot: &BootConfig,
    ) -> Result<RunStatus, ExecutionError> {
        Err(ExecutionError::Unreachable("no ipc connection".to_string()))
    }
}

struct AlwaysFail;

#[async_trait]
impl ExperimentExecutor for AlwaysFail {
    async fn execute(
        &self,
        _experiment: &ExperimentDefinition,
        _boot: &BootConfig,
    ) -> Result<RunStatus, ExecutionError> {
        Ok(RunStatus::Fail)
    }
}

#[tokio::test]
async fn test_node_execute_appends_to_history() {
    let node = node("a");
    let mut history = OutcomeHistory::new();

    let status = node
        .execute(&AlwaysFail, &BootConfig::new(), &mut history)
        .await
        .unwrap();
    assert_eq!(status, RunStatus::Fail);

    node.execute(&AlwaysFail, &BootConfig::new(), &mut history)
        .await
        .unwrap();
    assert_eq!(history.as_slice(), &[RunStatus::Fail, RunStatus::Fail]);
}

#[tokio::test]
async fn test_execution_error_is_recorded_as_error() {
    let node = node("a");
    let mut history = OutcomeHistory::new();

    let err = node
        .execute(&Unreachable, &BootConfig::new(), &mut history)
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::Unreachable(_)));
    assert_eq!(history.as_slice(), &[RunStatus::Error]);
    assert_eq!(
        node.policy().next_port(&history),
        autoflow_core::FAIL_PORT,
        "ERROR routes like FAIL"
    );
}
