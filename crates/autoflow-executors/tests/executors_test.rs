// crates/autoflow-executors/tests/executors_test.rs

use autoflow_core::{
    BootConfig, ExecutionError, ExperimentDefinition, ExperimentExecutor, FlowGraph, FlowNode,
    RoutingPolicy, RunStatus, Value,
};
use autoflow_executors::{default_registry, CommandExecutor, SimulatedExecutor};
use autoflow_runtime::{FlowRuntime, RunPhase, RuntimeConfig};
use std::sync::Arc;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

fn statuses(list: &[&str]) -> Value {
    Value::Array(list.iter().map(|s| Value::from(*s)).collect())
}

#[tokio::test]
async fn test_simulated_cycles_outcomes_per_experiment() {
    let executor = SimulatedExecutor::new();
    let boot = BootConfig::new();
    let flaky =
        ExperimentDefinition::new("flaky").with_parameter("outcomes", statuses(&["FAIL", "PASS"]));
    let other =
        ExperimentDefinition::new("other").with_parameter("outcomes", statuses(&["FAIL", "PASS"]));

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(executor.execute(&flaky, &boot).await.unwrap());
    }
    assert_eq!(seen, vec![RunStatus::Fail, RunStatus::Pass, RunStatus::Fail]);

    // Independent cursor per experiment name.
    assert_eq!(executor.execute(&other, &boot).await, Ok(RunStatus::Fail));
    assert_eq!(executor.call_count("flaky").await, 3);
}

#[tokio::test]
async fn test_simulated_defaults_and_errors() {
    let executor = SimulatedExecutor::new();
    let boot = BootConfig::new();

    let plain = ExperimentDefinition::new("plain");
    assert_eq!(executor.execute(&plain, &boot).await, Ok(RunStatus::Pass));

    let single = ExperimentDefinition::new("single").with_parameter("outcome", "fail");
    assert_eq!(executor.execute(&single, &boot).await, Ok(RunStatus::Fail));

    let offline = ExperimentDefinition::new("offline").with_parameter("error", "no serial console");
    assert_eq!(
        executor.execute(&offline, &boot).await,
        Err(ExecutionError::Unreachable("no serial console".to_string()))
    );

    let bogus = ExperimentDefinition::new("bogus").with_parameter("outcome", "MAYBE");
    assert!(matches!(
        executor.execute(&bogus, &boot).await,
        Err(ExecutionError::Configuration(_))
    ));
}

#[tokio::test]
async fn test_default_registry_runs_adaptive_flow() {
    init_tracing();

    // Retry until two of the last three attempts fail, then escalate.
    let graph = Arc::new(
        FlowGraph::from_nodes(
            "adaptive",
            "boot",
            vec![
                FlowNode::new(
                    "boot",
                    ExperimentDefinition::new("boot test")
                        .with_parameter("outcomes", statuses(&["PASS", "FAIL", "FAIL"])),
                )
                .with_policy(RoutingPolicy::Adaptive {
                    threshold: 1,
                    window: 3,
                })
                .with_output(0, "escalate")
                .with_output(1, "boot"),
                FlowNode::new(
                    "escalate",
                    ExperimentDefinition::new("collect logs").with_kind("simulated"),
                ),
            ],
        )
        .unwrap(),
    );

    let runtime = FlowRuntime::with_config(
        Arc::new(default_registry()),
        RuntimeConfig::default().without_heartbeat(),
    );
    let report = runtime.run_to_completion(graph).await.unwrap();

    assert_eq!(report.phase, RunPhase::Completed);
    assert_eq!(report.path, vec!["boot", "boot", "boot", "escalate"]);
    assert_eq!(
        report.history("boot"),
        &[RunStatus::Pass, RunStatus::Fail, RunStatus::Fail]
    );
}

#[test]
fn test_default_registry_kinds() {
    let registry = default_registry();
    assert_eq!(registry.list_kinds(), vec!["command", "simulated"]);
    assert_eq!(registry.default_kind(), Some("simulated"));
}

#[cfg(unix)]
mod command {
    use super::*;
    use std::time::Duration;

    fn shell(script: &str) -> ExperimentDefinition {
        ExperimentDefinition::new("shell")
            .with_kind("command")
            .with_parameter("program", "sh")
            .with_parameter("args", Value::Array(vec![Value::from("-c"), Value::from(script)]))
    }

    #[tokio::test]
    async fn test_exit_code_maps_to_status() {
        let executor = CommandExecutor::new();
        let boot = BootConfig::new();

        assert_eq!(executor.execute(&shell("exit 0"), &boot).await, Ok(RunStatus::Pass));
        assert_eq!(executor.execute(&shell("exit 3"), &boot).await, Ok(RunStatus::Fail));
    }

    #[tokio::test]
    async fn test_boot_settings_reach_the_environment() {
        let executor = CommandExecutor::new();
        let boot = BootConfig::new().with_setting("firmware", "1.2.3");

        let check = shell(r#"test "$AUTOFLOW_BOOT_FIRMWARE" = "1.2.3""#);
        assert_eq!(executor.execute(&check, &boot).await, Ok(RunStatus::Pass));
    }

    #[tokio::test]
    async fn test_missing_program_is_unreachable() {
        let executor = CommandExecutor::new();
        let experiment = ExperimentDefinition::new("ghost")
            .with_parameter("program", "/nonexistent/autoflow-test-binary");

        assert!(matches!(
            executor.execute(&experiment, &BootConfig::new()).await,
            Err(ExecutionError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_an_execution_error() {
        let executor = CommandExecutor::new().with_default_timeout(Duration::from_millis(50));
        let result = executor.execute(&shell("sleep 5"), &BootConfig::new()).await;
        assert_eq!(result, Err(ExecutionError::Timeout { millis: 50 }));
        assert_eq!(
            result.unwrap_err().to_string(),
            "Timeout after 50ms"
        );
    }

    #[tokio::test]
    async fn test_program_parameter_is_required() {
        let executor = CommandExecutor::new();
        let result = executor
            .execute(&ExperimentDefinition::new("empty"), &BootConfig::new())
            .await;
        assert!(matches!(result, Err(ExecutionError::Configuration(_))));
    }
}
