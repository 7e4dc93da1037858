use crate::channel::{control_channel, SupervisorHandle};
use crate::runner::FlowRunner;
use crate::state::RunReport;
use autoflow_core::{BootConfig, ExperimentExecutor, FlowError, FlowGraph, RunId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Main entry point for running flows against an executor
pub struct FlowRuntime {
    executor: Arc<dyn ExperimentExecutor>,
    config: RuntimeConfig,
    boot: BootConfig,
}

impl FlowRuntime {
    /// Create a new runtime with default settings
    pub fn new(executor: Arc<dyn ExperimentExecutor>) -> Self {
        Self::with_config(executor, RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(executor: Arc<dyn ExperimentExecutor>, config: RuntimeConfig) -> Self {
        Self {
            executor,
            config,
            boot: BootConfig::default(),
        }
    }

    pub fn with_boot_config(mut self, boot: BootConfig) -> Self {
        self.boot = boot;
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Build a runner for `graph`. Fails if the graph does not validate.
    pub fn runner(&self, graph: Arc<FlowGraph>) -> Result<FlowRunner, FlowError> {
        let runner = FlowRunner::new(graph, self.executor.clone(), self.config.clone())?
            .with_boot_config(self.boot.clone());
        Ok(runner)
    }

    /// Start a run on its own task and hand back the supervisor side.
    pub fn start(&self, graph: Arc<FlowGraph>) -> Result<RunHandle, FlowError> {
        let runner = self.runner(graph)?;
        let (endpoint, supervisor) =
            control_channel(self.config.channel_capacity, self.config.put_timeout());
        let run_id = RunId::new_v4();

        tracing::info!("Spawning run {}", run_id);
        let join = tokio::spawn(async move { runner.run_with_id(run_id, endpoint).await });

        Ok(RunHandle {
            run_id,
            supervisor,
            join,
        })
    }

    /// Run `graph` to the end without a supervisor, discarding events.
    pub async fn run_to_completion(&self, graph: Arc<FlowGraph>) -> Result<RunReport, FlowError> {
        let handle = self.start(graph)?;
        handle.drain_and_wait().await
    }
}

/// A run in flight: send commands and read events through `supervisor`.
pub struct RunHandle {
    run_id: RunId,
    supervisor: SupervisorHandle,
    join: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn supervisor(&mut self) -> &mut SupervisorHandle {
        &mut self.supervisor
    }

    pub fn into_parts(self) -> (SupervisorHandle, JoinHandle<RunReport>) {
        (self.supervisor, self.join)
    }

    /// Wait for the run to end. Events still queued stay readable until the
    /// handle is dropped.
    pub async fn wait(self) -> Result<RunReport, FlowError> {
        let (_supervisor, join) = self.into_parts();
        join_report(join).await
    }

    /// Discard events as they arrive so the runner never sees a full queue,
    /// then wait for the report.
    pub async fn drain_and_wait(self) -> Result<RunReport, FlowError> {
        let (supervisor, join) = self.into_parts();
        let (_commands, mut events) = supervisor.into_parts();
        let drain = tokio::spawn(async move {
            let mut seen = 0u64;
            while events.get().await.is_some() {
                seen += 1;
            }
            seen
        });

        let report = join_report(join).await;
        if let Ok(seen) = drain.await {
            tracing::debug!("Discarded {} events", seen);
        }
        report
    }
}

async fn join_report(join: JoinHandle<RunReport>) -> Result<RunReport, FlowError> {
    join.await
        .map_err(|e| FlowError::Runner(format!("run task failed: {}", e)))
}

/// Configuration for the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Slots in each direction of the control channel.
    pub channel_capacity: usize,
    /// How long a put waits for a free slot. Zero never waits.
    pub put_timeout_ms: u64,
    /// HEARTBEAT period; `None` disables heartbeats.
    pub heartbeat_interval_ms: Option<u64>,
    /// Start runs with step mode on.
    pub step_mode: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
            put_timeout_ms: 0,
            heartbeat_interval_ms: Some(5000),
            step_mode: false,
        }
    }
}

impl RuntimeConfig {
    pub fn put_timeout(&self) -> Duration {
        Duration::from_millis(self.put_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn with_step_mode(mut self, step_mode: bool) -> Self {
        self.step_mode = step_mode;
        self
    }

    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat_interval_ms = None;
        self
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
