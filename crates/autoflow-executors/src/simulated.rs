use async_trait::async_trait;
use autoflow_core::{
    BootConfig, ExecutionError, ExperimentDefinition, ExperimentExecutor, RunStatus, Value,
};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

pub const KIND: &str = "simulated";

/// Executor that replays outcomes from the experiment's own parameters.
///
/// Parameters:
/// - `outcomes`: list of statuses, cycled per experiment name across calls
/// - `outcome`: single status used when `outcomes` is absent (default PASS)
/// - `delay_ms`: how long each execution takes
/// - `error`: if set, every execution fails with this message as if the
///   hardware were unreachable
pub struct SimulatedExecutor {
    calls: Mutex<HashMap<String, usize>>,
}

impl SimulatedExecutor {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// How many times `experiment` has been executed.
    pub async fn call_count(&self, experiment: &str) -> usize {
        self.calls.lock().await.get(experiment).copied().unwrap_or(0)
    }

    async fn next_call(&self, experiment: &str) -> usize {
        let mut calls = self.calls.lock().await;
        let count = calls.entry(experiment.to_string()).or_insert(0);
        let index = *count;
        *count += 1;
        index
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_status(
    experiment: &ExperimentDefinition,
    value: &Value,
) -> Result<RunStatus, ExecutionError> {
    let text = value.as_str().ok_or_else(|| {
        ExecutionError::Configuration(format!(
            "experiment '{}': outcomes must be status strings",
            experiment.name()
        ))
    })?;
    text.parse().map_err(|e| {
        ExecutionError::Configuration(format!("experiment '{}': {}", experiment.name(), e))
    })
}

#[async_trait]
impl ExperimentExecutor for SimulatedExecutor {
    async fn execute(
        &self,
        experiment: &ExperimentDefinition,
        _boot: &BootConfig,
    ) -> Result<RunStatus, ExecutionError> {
        let call = self.next_call(experiment.name()).await;

        if let Some(delay_ms) = experiment.parameter("delay_ms").and_then(Value::as_u64) {
            sleep(Duration::from_millis(delay_ms)).await;
        }

        if let Some(message) = experiment.parameter("error") {
            let message = message.as_str().unwrap_or("simulated failure").to_string();
            return Err(ExecutionError::Unreachable(message));
        }

        let status = match experiment.parameter("outcomes") {
            Some(outcomes) => {
                let outcomes = outcomes.as_array().ok_or_else(|| {
                    ExecutionError::Configuration(format!(
                        "experiment '{}': outcomes must be a list",
                        experiment.name()
                    ))
                })?;
                match outcomes.get(call % outcomes.len().max(1)) {
                    Some(value) => parse_status(experiment, value)?,
                    None => RunStatus::Pass,
                }
            }
            None => match experiment.parameter("outcome") {
                Some(value) => parse_status(experiment, value)?,
                None => RunStatus::Pass,
            },
        };

        tracing::debug!(
            "Simulated '{}' call {} -> {}",
            experiment.name(),
            call + 1,
            status
        );
        Ok(status)
    }
}
