// crates/autoflow-core/tests/message_test.rs

use autoflow_core::{
    into_payload, Command, CommandMessage, ControlMessage, EventKind, EventMessage, RunId,
};
use serde_json::json;

#[test]
fn test_command_wire_format() {
    let run_id = RunId::new_v4();
    let message: ControlMessage = CommandMessage::new(Command::StepContinue)
        .for_run(run_id)
        .into();

    let line = message.to_json_line().unwrap();
    let raw: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(raw["type"], "step_continue");
    assert_eq!(raw["runId"], run_id.to_string());
    assert!(raw["data"].is_object());
    assert!(raw.get("timestamp").is_some());

    let parsed = ControlMessage::from_json_line(&line).unwrap();
    assert_eq!(parsed, message);
}

#[test]
fn test_event_wire_format() {
    let event = EventMessage::new(
        EventKind::ExperimentStart,
        7,
        None,
        into_payload(json!({ "nodeId": "a", "experimentName": "Baseline" })),
    );

    let line = ControlMessage::from(event.clone()).to_json_line().unwrap();
    assert!(!line.contains('\n'));
    let raw: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(raw["type"], "experiment_start");
    assert_eq!(raw["seq"], 7);
    assert_eq!(raw["data"]["experimentName"], "Baseline");
    assert!(raw.get("runId").is_none());

    match ControlMessage::from_json_line(&line).unwrap() {
        ControlMessage::Event(parsed) => {
            assert_eq!(parsed, event);
            assert_eq!(parsed.node_id(), Some("a"));
        }
        other => panic!("expected an event, got {:?}", other),
    }
}

#[test]
fn test_hand_written_command_without_data() {
    let line = r#"{"type":"cancel","timestamp":"2024-05-01T10:00:00Z"}"#;
    match ControlMessage::from_json_line(line).unwrap() {
        ControlMessage::Command(message) => {
            assert_eq!(message.command, Command::Cancel);
            assert!(message.data.is_empty());
            assert_eq!(message.run_id, None);
        }
        other => panic!("expected a command, got {:?}", other),
    }
}

#[test]
fn test_unknown_message_type_is_rejected() {
    let line = r#"{"type":"reboot","timestamp":"2024-05-01T10:00:00Z","seq":1}"#;
    assert!(ControlMessage::from_json_line(line).is_err());
}

#[test]
fn test_scalar_payload_is_wrapped() {
    let payload = into_payload(json!(42));
    assert_eq!(payload.get("value"), Some(&json!(42)));
}
