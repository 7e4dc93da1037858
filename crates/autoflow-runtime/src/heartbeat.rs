// crates/autoflow-runtime/src/heartbeat.rs

use crate::emitter::EventEmitter;
use crate::state::RunPhase;
use autoflow_core::{EventKind, NodeId};
use serde_json::json;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// What the heartbeat reports. Published by the runner through a watch
/// channel, so the heartbeat never touches run state directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Pulse {
    pub phase: RunPhase,
    pub node: Option<NodeId>,
    pub executions: usize,
}

/// Background task emitting HEARTBEAT on a fixed interval, independent of the
/// runner loop. Keeps beating while the runner waits on an executor.
pub struct Heartbeat {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    pub fn spawn(emitter: EventEmitter, period: Duration, pulse: watch::Receiver<Pulse>) -> Self {
        let token = CancellationToken::new();
        let child = token.child_token();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut beats: u64 = 0;

            loop {
                tokio::select! {
                    biased;
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        beats += 1;
                        let current = pulse.borrow().clone();
                        emitter
                            .emit_json(
                                EventKind::Heartbeat,
                                json!({
                                    "beat": beats,
                                    "phase": current.phase,
                                    "nodeId": current.node,
                                    "executions": current.executions,
                                }),
                            )
                            .await;
                    }
                }
            }
            tracing::debug!("Heartbeat stopped after {} beats", beats);
        });

        Self { token, handle }
    }

    /// Stop beating and wait for the task, so no heartbeat follows the
    /// final event of a run.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!("Heartbeat task ended abnormally: {}", e);
        }
    }
}
