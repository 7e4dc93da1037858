//! Flow execution runtime
//!
//! This crate provides the engine that runs a flow graph: the runner state
//! machine, the bounded control channel between runner and supervisor, the
//! heartbeat, the executor registry and the stdio transport used to run a
//! flow in a worker process.

mod analysis;
mod channel;
mod emitter;
mod heartbeat;
mod registry;
mod runner;
mod runtime;
mod state;
pub mod transport;

pub use analysis::{analyze, GraphAnalysis};
pub use channel::{
    bounded, control_channel, ChannelReceiver, ChannelSender, CommandSender, RunnerEndpoint,
    SupervisorHandle,
};
pub use emitter::EventEmitter;
pub use heartbeat::{Heartbeat, Pulse};
pub use registry::{ExecutorEntry, ExecutorRegistry};
pub use runner::FlowRunner;
pub use runtime::{FlowRuntime, RunHandle, RuntimeConfig};
pub use state::{RunPhase, RunReport, RunState, Termination, TerminationKind};
