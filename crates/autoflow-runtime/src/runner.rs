// crates/autoflow-runtime/src/runner.rs

use crate::analysis::analyze;
use crate::channel::{ChannelReceiver, RunnerEndpoint};
use crate::emitter::EventEmitter;
use crate::heartbeat::{Heartbeat, Pulse};
use crate::runtime::RuntimeConfig;
use crate::state::{RunPhase, RunReport, RunState, Termination};
use autoflow_core::{
    into_payload, BootConfig, ChannelError, Command, CommandMessage, EventKind, ExecutionError,
    ExperimentExecutor, FlowGraph, FlowNode, NodeId, Port, RunId, RunStatus, ValidationError,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Walks a flow graph one node at a time, routing on each node's outcome
/// history, until a terminal port, a stop command or an execution error.
///
/// The runner owns all run state. A supervisor observes it only through
/// events and influences it only through commands.
pub struct FlowRunner {
    graph: Arc<FlowGraph>,
    executor: Arc<dyn ExperimentExecutor>,
    boot: BootConfig,
    config: RuntimeConfig,
}

#[derive(Debug)]
enum Exit {
    Completed { node: NodeId, port: Port },
    Cancelled { graceful: bool, reason: String },
    Errored { node: NodeId, error: ExecutionError },
}

enum Flow {
    Continue,
    Stop(Exit),
}

struct RunContext {
    state: RunState,
    emitter: EventEmitter,
    commands: ChannelReceiver<CommandMessage>,
    pulse: watch::Sender<Pulse>,
}

impl FlowRunner {
    /// Validates the graph up front; a malformed graph never starts running.
    pub fn new(
        graph: Arc<FlowGraph>,
        executor: Arc<dyn ExperimentExecutor>,
        config: RuntimeConfig,
    ) -> Result<Self, ValidationError> {
        graph.validate()?;

        let analysis = analyze(&graph);
        for id in &analysis.unreachable {
            warn!(
                "Node '{}' is unreachable from start node '{}'",
                id,
                graph.start()
            );
        }
        if !analysis.terminal_reachable {
            warn!(
                "Flow '{}' has no reachable terminal port; it will only stop when cancelled",
                graph.name()
            );
        }

        Ok(Self {
            graph,
            executor,
            boot: BootConfig::default(),
            config,
        })
    }

    pub fn with_boot_config(mut self, boot: BootConfig) -> Self {
        self.boot = boot;
        self
    }

    pub fn graph(&self) -> &Arc<FlowGraph> {
        &self.graph
    }

    pub async fn run(&self, endpoint: RunnerEndpoint) -> RunReport {
        self.run_with_id(RunId::new_v4(), endpoint).await
    }

    /// Execute one run to its end. Every run finishes with exactly one
    /// PROCESS_COMPLETE event, whatever the outcome.
    pub async fn run_with_id(&self, run_id: RunId, endpoint: RunnerEndpoint) -> RunReport {
        let RunnerEndpoint { events, commands } = endpoint;
        let emitter = EventEmitter::new(run_id, events);
        let state = RunState::new(run_id, self.graph.start().clone(), self.config.step_mode);

        let (pulse, pulse_rx) = watch::channel(pulse_of(&state));
        let heartbeat = self
            .config
            .heartbeat_interval()
            .map(|period| Heartbeat::spawn(emitter.clone(), period, pulse_rx));

        let mut ctx = RunContext {
            state,
            emitter,
            commands,
            pulse,
        };

        info!(
            "Starting flow '{}' (run {}) at node '{}'",
            self.graph.name(),
            run_id,
            self.graph.start()
        );
        ctx.emitter
            .emit_json(
                EventKind::ProcessReady,
                json!({
                    "graph": self.graph.name(),
                    "startNode": self.graph.start(),
                    "totalCount": self.graph.len(),
                    "stepMode": ctx.state.step_mode,
                }),
            )
            .await;
        self.set_phase(&mut ctx, RunPhase::Running, "run started")
            .await;

        let exit = self.drive(&mut ctx).await;

        if let Some(heartbeat) = heartbeat {
            heartbeat.stop().await;
        }
        self.finish(ctx, exit).await
    }

    async fn drive(&self, ctx: &mut RunContext) -> Exit {
        loop {
            if let Flow::Stop(exit) = self.poll_commands(ctx).await {
                return exit;
            }

            let Some(node_id) = ctx.state.current.clone() else {
                return Exit::Errored {
                    node: self.graph.start().clone(),
                    error: ExecutionError::Failed("no node left to run".to_string()),
                };
            };
            let Some(node) = self.graph.node(&node_id) else {
                return Exit::Errored {
                    error: ExecutionError::Failed(format!(
                        "node '{}' is not part of the graph",
                        node_id
                    )),
                    node: node_id,
                };
            };

            match self.step(ctx, node).await {
                Ok((_, Some(next))) => {
                    ctx.state.current = Some(next);
                    if ctx.state.step_mode || ctx.state.single_step {
                        ctx.state.pause_pending = true;
                    }
                }
                Ok((port, None)) => {
                    return Exit::Completed {
                        node: node_id,
                        port,
                    }
                }
                Err(error) => {
                    return Exit::Errored {
                        node: node_id,
                        error,
                    }
                }
            }
        }
    }

    /// Apply queued commands in the order they arrived, then honor a pause
    /// scheduled by step mode or a single step.
    async fn poll_commands(&self, ctx: &mut RunContext) -> Flow {
        loop {
            match ctx.commands.try_get() {
                Ok(Some(message)) => {
                    if let Flow::Stop(exit) = self.apply(ctx, message.command).await {
                        return Flow::Stop(exit);
                    }
                }
                Ok(None) => break,
                Err(ChannelError::Closed) => {
                    debug!("Command channel closed; run continues without supervisor");
                    break;
                }
                Err(e) => {
                    warn!("Failed to read commands: {}", e);
                    break;
                }
            }
        }

        if ctx.state.pause_pending {
            return self.pause(ctx, "step").await;
        }
        Flow::Continue
    }

    async fn apply(&self, ctx: &mut RunContext, command: Command) -> Flow {
        debug!("Received command: {}", command);
        match command {
            Command::Cancel => Flow::Stop(Exit::Cancelled {
                graceful: false,
                reason: "cancel requested".to_string(),
            }),
            Command::End => Flow::Stop(Exit::Cancelled {
                graceful: true,
                reason: "end requested".to_string(),
            }),
            Command::Pause => self.pause(ctx, "pause requested").await,
            Command::Resume | Command::StepContinue => {
                debug!("Ignoring {}: run is not paused", command);
                Flow::Continue
            }
            Command::EnableStepMode => {
                self.set_step_mode(ctx, true).await;
                Flow::Continue
            }
            Command::DisableStepMode => {
                self.set_step_mode(ctx, false).await;
                Flow::Continue
            }
        }
    }

    /// Block until the supervisor resumes, steps or stops the run. Any pause
    /// scheduled by step mode or a single step.or a single step is served by this one.
    async fn pause(&self, ctx: &mut RunContext, reason: &str) -> Flow {
        ctx.state.pause_pending = false;
        ctx.state.single_step = false;
        self.set_phase(ctx, RunPhase::Paused, reason).await;
        info!(
            "Run {} paused ({}) before node {:?}",
            ctx.state.run_id, reason, ctx.state.current
        );

        loop {
            let Some(message) = ctx.commands.get().await else {
                warn!("Command channel closed while paused; cancelling run");
                return Flow::Stop(Exit::Cancelled {
                    graceful: false,
                    reason: "supervisor disconnected".to_string(),
                });
            };

            match message.command {
                Command::Resume => {
                    self.set_phase(ctx, RunPhase::Running, "resumed").await;
                    return Flow::Continue;
                }
                Command::StepContinue => {
                    ctx.state.single_step = true;
                    self.set_phase(ctx, RunPhase::Running, "single step").await;
                    return Flow::Continue;
                }
                Command::Cancel => {
                    return Flow::Stop(Exit::Cancelled {
                        graceful: false,
                        reason: "cancel requested".to_string(),
                    })
                }
                Command::End => {
                    return Flow::Stop(Exit::Cancelled {
                        graceful: true,
                        reason: "end requested".to_string(),
                    })
                }
                Command::Pause => debug!("Ignoring pause: run is already paused"),
                Command::EnableStepMode => self.set_step_mode(ctx, true).await,
                Command::DisableStepMode => self.set_step_mode(ctx, false).await,
            }
        }
    }

    /// Run one node and pick its port and successor. No successor means the
    /// chosen port is unwired and the run is complete.
    async fn step(
        &self,
        ctx: &mut RunContext,
        node: &FlowNode,
    ) -> Result<(Port, Option<NodeId>), ExecutionError> {
        let node_id = node.id();
        let experiment = node.experiment().name();
        let visit = ctx.state.visits(node_id) + 1;

        info!(
            "Executing node '{}' ({}), visit {}",
            node.name(),
            experiment,
            visit
        );
        ctx.emitter
            .emit_json(
                EventKind::ExperimentStart,
                json!({
                    "nodeId": node_id,
                    "nodeName": node.name(),
                    "experimentName": experiment,
                    "visit": visit,
                    "iteration": ctx.state.executions() + 1,
                }),
            )
            .await;

        ctx.state.path.push(node_id.clone());
        let result = node
            .execute(
                self.executor.as_ref(),
                &self.boot,
                ctx.state.history_mut(node_id),
            )
            .await;
        publish_pulse(ctx);

        let status = match result {
            Ok(status) => status,
            Err(e) => {
                error!("Node '{}' could not be executed: {}", node.name(), e);
                return Err(e);
            }
        };

        let history = ctx.state.history_mut(node_id).clone();
        info!("Node '{}' finished: {}", node.name(), status);
        ctx.emitter
            .emit_json(
                EventKind::ExperimentComplete,
                json!({
                    "nodeId": node_id,
                    "nodeName": node.name(),
                    "experimentName": experiment,
                    "status": status,
                    "visit": visit,
                    "history": history,
                    "classification": history.classify(),
                }),
            )
            .await;
        ctx.emitter
            .emit_json(
                EventKind::ProgressUpdate,
                json!({
                    "nodeId": node_id,
                    "completedCount": ctx.state.executions(),
                    "totalCount": self.graph.len(),
                }),
            )
            .await;

        let port = node.policy().next_port(&history);
        let next = node.successor_for(port).cloned();
        match &next {
            Some(successor) => debug!(
                "Node '{}' routed to port {} -> '{}'",
                node.name(),
                port,
                successor
            ),
            None => info!(
                "Node '{}' routed to unwired port {}; flow ends here",
                node.name(),
                port
            ),
        }
        ctx.emitter
            .emit_json(
                EventKind::IterationComplete,
                json!({
                    "nodeId": node_id,
                    "status": status,
                    "policy": node.policy().name(),
                    "port": port,
                    "nextNodeId": next,
                }),
            )
            .await;

        Ok((port, next))
    }

    async fn set_phase(&self, ctx: &mut RunContext, phase: RunPhase, reason: &str) {
        if !ctx.state.transition(phase) {
            return;
        }
        publish_pulse(ctx);
        ctx.emitter
            .emit_json(
                EventKind::StatusUpdate,
                json!({
                    "phase": phase,
                    "reason": reason,
                    "nodeId": ctx.state.current,
                    "stepMode": ctx.state.step_mode,
                }),
            )
            .await;
    }

    async fn set_step_mode(&self, ctx: &mut RunContext, enabled: bool) {
        if ctx.state.step_mode == enabled {
            return;
        }
        ctx.state.step_mode = enabled;
        // Takes effect before the next node, not after it. Disabling drops a
        // step-mode pause but never the one a STEP_CONTINUE owes.
        if enabled {
            if ctx.state.phase() == RunPhase::Running && ctx.state.executions() > 0 {
                ctx.state.pause_pending = true;
            }
        } else if !ctx.state.single_step {
            ctx.state.pause_pending = false;
        }
        info!(
            "Step mode {}",
            if enabled { "enabled" } else { "disabled" }
        );
        ctx.emitter
            .emit_json(
                EventKind::StatusUpdate,
                json!({
                    "phase": ctx.state.phase(),
                    "reason": if enabled { "step mode enabled" } else { "step mode disabled" },
                    "nodeId": ctx.state.current,
                    "stepMode": enabled,
                }),
            )
            .await;
    }

    async fn finish(&self, mut ctx: RunContext, exit: Exit) -> RunReport {
        let summary = match exit {
            Exit::Completed { node, port } => {
                let termination = Termination::unwired(node, port);
                ctx.state.transition(RunPhase::Completed);
                ctx.state.current = None;
                info!(
                    "Flow '{}' completed after {} node executions: {}",
                    self.graph.name(),
                    ctx.state.executions(),
                    termination.reason
                );
                let summary = json!({
                    "completed": true,
                    "cancelled": false,
                    "errored": false,
                    "reason": termination.reason,
                    "termination": termination,
                });
                ctx.state.termination = Some(termination);
                summary
            }
            Exit::Cancelled { graceful, reason } => {
                ctx.state.graceful_stop = graceful;
                ctx.state.transition(RunPhase::Cancelled);
                info!("Flow '{}' stopped: {}", self.graph.name(), reason);
                json!({
                    "completed": false,
                    "cancelled": true,
                    "graceful": graceful,
                    "errored": false,
                    "reason": reason,
                })
            }
            Exit::Errored { node, error } => {
                let message = error.to_string();
                ctx.emitter
                    .emit_json(
                        EventKind::ProcessError,
                        json!({
                            "nodeId": node,
                            "nodeName": self.graph.node(&node).map(FlowNode::name),
                            "status": RunStatus::Error,
                            "error": message,
                        }),
                    )
                    .await;
                ctx.state.error = Some(message.clone());
                ctx.state.transition(RunPhase::Errored);
                error!(
                    "Flow '{}' aborted at node '{}': {}",
                    self.graph.name(),
                    node,
                    message
                );
                json!({
                    "completed": false,
                    "cancelled": false,
                    "errored": true,
                    "error": message,
                })
            }
        };

        let mut data = into_payload(summary);
        data.insert("phase".to_string(), json!(ctx.state.phase()));
        data.insert("executions".to_string(), json!(ctx.state.executions()));
        data.insert("path".to_string(), json!(ctx.state.path));
        ctx.emitter.emit(EventKind::ProcessComplete, data).await;
        publish_pulse(&ctx);

        build_report(&ctx)
    }
}

fn pulse_of(state: &RunState) -> Pulse {
    Pulse {
        phase: state.phase(),
        node: state.current.clone(),
        executions: state.executions(),
    }
}

fn publish_pulse(ctx: &RunContext) {
    ctx.pulse.send_replace(pulse_of(&ctx.state));
}

fn build_report(ctx: &RunContext) -> RunReport {
    let state = &ctx.state;
    let histories: std::collections::BTreeMap<_, _> = state
        .histories()
        .iter()
        .map(|(id, history)| (id.clone(), history.clone()))
        .collect();
    let classifications = histories
        .iter()
        .map(|(id, history)| (id.clone(), history.classify()))
        .collect();

    RunReport {
        run_id: state.run_id,
        phase: state.phase(),
        path: state.path.clone(),
        histories,
        classifications,
        current: state.current.clone(),
        termination: state.termination.clone(),
        graceful_stop: state.graceful_stop,
        error: state.error.clone(),
        last_seq: ctx.emitter.last_seq(),
        events_delivered: ctx.emitter.delivered(),
        events_dropped: ctx.emitter.dropped(),
    }
}
