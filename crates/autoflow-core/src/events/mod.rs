// crates/autoflow-core/src/events/mod.rs

mod message;

pub use message::{
    into_payload, Command, CommandMessage, ControlMessage, EventKind, EventMessage, Payload,
    RunId,
};
