use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type RunId = Uuid;

/// Open key/value payload carried by every message.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Supervisor → runner instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Cancel,
    Pause,
    Resume,
    /// While paused: run exactly one more node, then pause again.
    StepContinue,
    /// Graceful stop: no further node runs, recorded results are kept.
    End,
    EnableStepMode,
    DisableStepMode,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Cancel => "cancel",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::StepContinue => "step_continue",
            Command::End => "end",
            Command::EnableStepMode => "enable_step_mode",
            Command::DisableStepMode => "disable_step_mode",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runner → supervisor notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StatusUpdate,
    ProgressUpdate,
    ExperimentStart,
    ExperimentComplete,
    IterationComplete,
    ProcessReady,
    ProcessComplete,
    ProcessError,
    Heartbeat,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::StatusUpdate => "status_update",
            EventKind::ProgressUpdate => "progress_update",
            EventKind::ExperimentStart => "experiment_start",
            EventKind::ExperimentComplete => "experiment_complete",
            EventKind::IterationComplete => "iteration_complete",
            EventKind::ProcessReady => "process_ready",
            EventKind::ProcessComplete => "process_complete",
            EventKind::ProcessError => "process_error",
            EventKind::Heartbeat => "heartbeat",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandMessage {
    #[serde(rename = "type")]
    pub command: Command,
    #[serde(default)]
    pub data: Payload,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
}

impl CommandMessage {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            data: Payload::new(),
            timestamp: Utc::now(),
            run_id: None,
        }
    }

    pub fn with_data(mut self, data: Payload) -> Self {
        self.data = data;
        self
    }

    pub fn for_run(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

impl From<Command> for CommandMessage {
    fn from(command: Command) -> Self {
        CommandMessage::new(command)
    }
}

/// A runner notification. `seq` increases by one per emitted event within a
/// run and is never reused, so a gap means a dropped event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub seq: u64,
    #[serde(default)]
    pub data: Payload,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
}

impl EventMessage {
    pub fn new(kind: EventKind, seq: u64, run_id: Option<RunId>, data: Payload) -> Self {
        Self {
            kind,
            seq,
            data,
            timestamp: Utc::now(),
            run_id,
        }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(|v| v.as_u64())
    }

    pub fn node_id(&self) -> Option<&str> {
        self.get_str("nodeId")
    }
}

/// Either direction of the control channel, as it travels on the wire:
/// `{"type": ..., "data": {...}, "timestamp": ..., "runId": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlMessage {
    Command(CommandMessage),
    Event(EventMessage),
}

impl ControlMessage {
    /// One line of newline-delimited JSON, without the trailing newline.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ControlMessage::Command(c) => c.timestamp,
            ControlMessage::Event(e) => e.timestamp,
        }
    }

    pub fn run_id(&self) -> Option<RunId> {
        match self {
            ControlMessage::Command(c) => c.run_id,
            ControlMessage::Event(e) => e.run_id,
        }
    }
}

impl From<CommandMessage> for ControlMessage {
    fn from(message: CommandMessage) -> Self {
        ControlMessage::Command(message)
    }
}

impl From<EventMessage> for ControlMessage {
    fn from(message: EventMessage) -> Self {
        ControlMessage::Event(message)
    }
}

/// Turn a `json!({...})` literal into a payload. Non-object values are
/// wrapped under `"value"`.
pub fn into_payload(value: serde_json::Value) -> Payload {
    match value {
        serde_json::Value::Object(map) => map,
        other => {
            let mut map = Payload::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}
