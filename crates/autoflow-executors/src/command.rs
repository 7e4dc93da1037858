use async_trait::async_trait;
use autoflow_core::{
    BootConfig, ExecutionError, ExperimentDefinition, ExperimentExecutor, RunStatus, Value,
};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

pub const KIND: &str = "command";

/// Prefix for boot settings exported to the child's environment.
pub const BOOT_ENV_PREFIX: &str = "AUTOFLOW_BOOT_";

/// Executor that runs an external program as the experiment.
///
/// Exit code 0 is PASS, any other exit is FAIL. A program that cannot be
/// started means the unit is unreachable, which the engine records as ERROR.
pub struct CommandExecutor {
    default_timeout: Option<Duration>,
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self {
            default_timeout: None,
        }
    }

    pub fn with_default_timeout(mut self, limit: Duration) -> Self {
        self.default_timeout = Some(limit);
        self
    }
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn env_key(setting: &str) -> String {
    let key: String = setting
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{}{}", BOOT_ENV_PREFIX, key)
}

fn env_value(value: &Value) -> String {
    match value.as_str() {
        Some(text) => text.to_string(),
        None => value.to_json().to_string(),
    }
}

#[async_trait]
impl ExperimentExecutor for CommandExecutor {
    async fn execute(
        &self,
        experiment: &ExperimentDefinition,
        boot: &BootConfig,
    ) -> Result<RunStatus, ExecutionError> {
        let program = experiment
            .require_parameter("program")?
            .as_str()
            .ok_or_else(|| {
                ExecutionError::Configuration(format!(
                    "experiment '{}': program must be a string",
                    experiment.name()
                ))
            })?;

        let args: Vec<String> = match experiment.parameter("args") {
            Some(Value::Array(items)) => items.iter().map(env_value).collect(),
            Some(Value::String(line)) => line.split_whitespace().map(str::to_string).collect(),
            Some(_) => {
                return Err(ExecutionError::Configuration(format!(
                    "experiment '{}': args must be a list or a string",
                    experiment.name()
                )))
            }
            None => Vec::new(),
        };

        let limit = experiment
            .parameter("timeout_ms")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .or(self.default_timeout);

        let mut cmd = Command::new(program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env("AUTOFLOW_EXPERIMENT", experiment.name());
        for (key, value) in boot.settings() {
            cmd.env(env_key(key), env_value(value));
        }

        tracing::info!("Running '{}' for experiment '{}'", program, experiment.name());

        let output = match limit {
            Some(limit) => timeout(limit, cmd.output()).await.map_err(|_| {
                ExecutionError::Timeout {
                    millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                }
            })?,
            None => cmd.output().await,
        }
        .map_err(|e| ExecutionError::Unreachable(format!("failed to run '{}': {}", program, e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            tracing::warn!("'{}' stderr: {}", program, stderr.trim());
        }

        if output.status.success() {
            Ok(RunStatus::Pass)
        } else {
            tracing::info!("'{}' exited with {}", program, output.status);
            Ok(RunStatus::Fail)
        }
    }
}
