// crates/autoflow-runtime/tests/transport_test.rs

use async_trait::async_trait;
use autoflow_core::{
    BootConfig, Command, CommandMessage, ControlMessage, EventKind, ExecutionError,
    ExperimentDefinition, ExperimentExecutor, FlowGraph, FlowNode, RunStatus,
};
use autoflow_runtime::transport::{connect_supervisor, read_commands, serve_runner, write_lines};
use autoflow_runtime::{bounded, FlowRunner, RunPhase, RuntimeConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};

struct AlwaysPass;

#[async_trait]
impl ExperimentExecutor for AlwaysPass {
    async fn execute(
        &self,
        _experiment: &ExperimentDefinition,
        _boot: &BootConfig,
    ) -> Result<RunStatus, ExecutionError> {
        Ok(RunStatus::Pass)
    }
}

fn graph() -> Arc<FlowGraph> {
    Arc::new(
        FlowGraph::from_nodes(
            "bridged",
            "a",
            vec![
                FlowNode::new("a", ExperimentDefinition::new("a")).with_output(1, "b"),
                FlowNode::new("b", ExperimentDefinition::new("b")),
            ],
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn test_commands_and_events_cross_the_bridge() {
    let (supervisor_end, worker_end) = tokio::io::duplex(4096);
    let (supervisor_read, supervisor_write) = tokio::io::split(supervisor_end);
    let (worker_read, worker_write) = tokio::io::split(worker_end);

    let config = RuntimeConfig::default()
        .without_heartbeat()
        .with_step_mode(true);

    let (endpoint, worker_tasks) = serve_runner(
        BufReader::new(worker_read),
        worker_write,
        64,
        Duration::ZERO,
    );
    let runner = FlowRunner::new(graph(), Arc::new(AlwaysPass), config).unwrap();
    let worker = tokio::spawn(async move {
        let report = runner.run(endpoint).await;
        let written = worker_tasks.finish_outbound().await.unwrap();
        (report, written)
    });

    let (mut supervisor, supervisor_tasks) = connect_supervisor(
        BufReader::new(supervisor_read),
        supervisor_write,
        64,
        Duration::ZERO,
    );

    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), supervisor.next_event())
            .await
            .expect("timed out waiting for the worker")
            .expect("worker stream ended early");
        let paused = event.kind == EventKind::StatusUpdate
            && event.get_str("phase") == Some("PAUSED");
        events.push(event);
        if paused {
            break;
        }
    }
    supervisor.send(Command::Resume).unwrap();

    while let Some(event) = supervisor.next_event().await {
        events.push(event);
    }
    let (report, written) = worker.await.unwrap();
    supervisor_tasks.finish_inbound().await.unwrap();

    assert_eq!(report.phase, RunPhase::Completed);
    assert_eq!(report.path, vec!["a", "b"]);
    assert_eq!(written, events.len() as u64);
    assert_eq!(events.last().unwrap().kind, EventKind::ProcessComplete);
    assert!(events.windows(2).all(|w| w[0].seq + 1 == w[1].seq));
}

#[tokio::test]
async fn test_reader_skips_blank_malformed_and_misdirected_lines() {
    let (mut writer, reader) = tokio::io::duplex(4096);
    let (sink, mut commands) = bounded::<CommandMessage>(16, Duration::ZERO);

    let event_line = r#"{"type":"heartbeat","seq":3,"data":{},"timestamp":"2024-05-01T12:00:00Z"}"#;
    let input = format!(
        "\n{}\nnot json\n{}\n{}\n",
        serde_json::to_string(&CommandMessage::new(Command::Pause)).unwrap(),
        event_line,
        serde_json::to_string(&CommandMessage::new(Command::Cancel)).unwrap(),
    );
    writer.write_all(input.as_bytes()).await.unwrap();
    drop(writer);

    let forwarded = read_commands(BufReader::new(reader), sink).await.unwrap();
    assert_eq!(forwarded, 2);

    let received: Vec<Command> = commands.drain().into_iter().map(|m| m.command).collect();
    assert_eq!(received, vec![Command::Pause, Command::Cancel]);
}

#[tokio::test]
async fn test_writer_emits_one_json_object_per_line() {
    let (sink, source) = bounded::<CommandMessage>(16, Duration::ZERO);
    sink.try_put(CommandMessage::new(Command::EnableStepMode)).unwrap();
    sink.try_put(CommandMessage::new(Command::StepContinue)).unwrap();
    drop(sink);

    let mut out = Vec::new();
    let written = write_lines(source, &mut out).await.unwrap();
    assert_eq!(written, 2);

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);

    let parsed = ControlMessage::from_json_line(lines[1]).unwrap();
    match parsed {
        ControlMessage::Command(message) => assert_eq!(message.command, Command::StepContinue),
        other => panic!("expected a command, got {:?}", other),
    }
}
